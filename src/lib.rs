//! Route Shortcuts
//!
//! Substitutes canned responses for requests that match configured
//! conditions, so that development and staging deployments can fake backend
//! behavior without touching handler code. Shortcuts are inert in
//! `production` and in any other excluded environment.
//!
//! # Features
//!
//! - **Substructure Matching**: Expected headers, query parameters and JSON
//!   or XML bodies only need to be contained in the request
//! - **Request Conditions**: Match by method, path, path parameters, headers,
//!   query params, body, or a custom predicate
//! - **First Match Wins**: Rules for a route are tried in registration order
//! - **Environment Gate**: A single flag turns all shortcuts off
//! - **Fail Fast Wiring**: Invalid patterns are rejected before serving
//!
//! # Example Configuration
//!
//! ```yaml
//! shortcuts:
//!   - id: greet-world
//!     route: /greet
//!     request:
//!       method: [POST]
//!       body:
//!         name: world
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           greeting: hi world
//! settings:
//!   environment: development
//! ```

pub mod agent;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod rule;
pub mod snapshot;
pub mod xml;

pub use agent::ShortcutAgent;
pub use config::{ResponseDefinition, ShortcutConfig};
pub use engine::{Decision, DecisionEngine};
pub use error::ConfigError;
pub use registry::ShortcutRegistry;
pub use rule::{Rule, ShortcutResponse};
pub use snapshot::RequestSnapshot;
