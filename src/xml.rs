//! XML request bodies as JSON-like values.
//!
//! The conversion follows the common xmltodict layout so that body patterns
//! are written the same way for XML and JSON requests:
//!
//! - the document becomes `{root_name: ...}`
//! - an element with only text becomes that string, an empty one `null`
//! - child elements become keys, repeated names collapse into a list
//! - attributes become `@name` keys, text next to children becomes `#text`

use serde_json::{Map, Value};
use sxd_document::dom::{ChildOfElement, Element};
use sxd_document::parser;

/// Element nesting beyond this is not converted.
pub const MAX_XML_DEPTH: usize = 128;

/// Parse an XML document. Returns `None` for malformed or overly deep XML.
pub fn parse_xml(text: &str) -> Option<Value> {
    let package = parser::parse(text).ok()?;
    let document = package.as_document();
    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| child.element())?;

    let mut map = Map::new();
    map.insert(
        root.name().local_part().to_string(),
        element_to_value(root, 0)?,
    );
    Some(Value::Object(map))
}

fn element_to_value(element: Element<'_>, depth: usize) -> Option<Value> {
    if depth >= MAX_XML_DEPTH {
        return None;
    }

    let mut map = Map::new();
    for attribute in element.attributes() {
        map.insert(
            format!("@{}", attribute.name().local_part()),
            Value::String(attribute.value().to_string()),
        );
    }

    let mut text = String::new();
    for child in element.children() {
        match child {
            ChildOfElement::Element(child) => {
                let name = child.name().local_part().to_string();
                let value = element_to_value(child, depth + 1)?;
                insert_repeated(&mut map, name, value);
            }
            ChildOfElement::Text(t) => text.push_str(t.text()),
            _ => {}
        }
    }

    let text = text.trim();
    if map.is_empty() {
        return Some(if text.is_empty() {
            Value::Null
        } else {
            Value::String(text.to_string())
        });
    }
    if !text.is_empty() {
        map.insert("#text".to_string(), Value::String(text.to_string()));
    }
    Some(Value::Object(map))
}

fn insert_repeated(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_elements() {
        let value = parse_xml("<req><name>world</name><lang>en</lang></req>").unwrap();
        assert_eq!(value, json!({"req": {"name": "world", "lang": "en"}}));
    }

    #[test]
    fn test_repeated_elements_become_list() {
        let value = parse_xml("<tags><tag>a</tag><tag>b</tag><tag>c</tag></tags>").unwrap();
        assert_eq!(value, json!({"tags": {"tag": ["a", "b", "c"]}}));
    }

    #[test]
    fn test_attributes_and_text() {
        let value = parse_xml(r#"<user id="7" role="admin">Ada<note/></user>"#).unwrap();
        assert_eq!(
            value,
            json!({"user": {"@id": "7", "@role": "admin", "note": null, "#text": "Ada"}})
        );
    }

    #[test]
    fn test_declaration_and_whitespace() {
        let value = parse_xml(
            "<?xml version=\"1.0\"?>\n<req>\n  <name> world </name>\n  <empty></empty>\n</req>\n",
        )
        .unwrap();
        assert_eq!(value, json!({"req": {"name": "world", "empty": null}}));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_xml("<req><name>world</req>").is_none());
        assert!(parse_xml("not xml at all").is_none());
        assert!(parse_xml("").is_none());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!(
            "{}x{}",
            "<a>".repeat(MAX_XML_DEPTH + 1),
            "</a>".repeat(MAX_XML_DEPTH + 1)
        );
        assert!(parse_xml(&deep).is_none());

        let shallow = format!("{}x{}", "<a>".repeat(4), "</a>".repeat(4));
        assert_eq!(
            parse_xml(&shallow).unwrap(),
            json!({"a": {"a": {"a": {"a": "x"}}}})
        );
    }
}
