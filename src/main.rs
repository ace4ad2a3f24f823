//! Route Shortcut - CLI Entry Point
//!
//! Validates shortcut configurations and dry-runs requests against them.

use anyhow::{Context, Result};
use clap::Parser;
use route_shortcut::snapshot::RequestFixture;
use route_shortcut::{Decision, ShortcutAgent, ShortcutConfig};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "route-shortcut",
    about = "Route shortcuts - validate configurations and dry-run requests",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "shortcuts.yaml")]
    config: PathBuf,

    /// Deployment environment, overrides the configuration
    #[arg(short, long, env = "SHORTCUT_ENV")]
    environment: Option<String>,

    /// Comma-separated extra environments where shortcuts stay disabled
    #[arg(long, env = "SHORTCUT_EXCLUSIONS")]
    exclusions: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Route identifier for a dry run
    #[arg(long, requires = "request")]
    route: Option<String>,

    /// JSON request fixture for a dry run
    #[arg(long, requires = "route")]
    request: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        ShortcutConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no shortcuts)");
        ShortcutConfig::default()
    };

    if let Some(environment) = args.environment {
        config.settings.environment = environment;
    }
    if let Some(exclusions) = &args.exclusions {
        config.settings.add_exclusions(exclusions);
    }

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} shortcuts defined, {} in environment '{}')",
            config.shortcuts.len(),
            if config.settings.shortcuts_enabled() {
                "enabled"
            } else {
                "disabled"
            },
            config.settings.environment
        );
        return Ok(());
    }

    let agent = ShortcutAgent::from_config(&config)?;

    let (Some(route), Some(request)) = (args.route, args.request) else {
        println!(
            "{} shortcuts wired across {} routes; shortcuts {}",
            agent.engine().registry().len(),
            agent.engine().registry().routes().count(),
            if agent.engine().is_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );
        return Ok(());
    };

    let content = std::fs::read_to_string(&request)
        .with_context(|| format!("Failed to read request fixture {}", request.display()))?;
    let fixture: RequestFixture = serde_json::from_str(&content)
        .with_context(|| format!("Invalid request fixture {}", request.display()))?;
    let snapshot = fixture.into_snapshot();

    match agent.on_request(&route, &snapshot) {
        Decision::PassThrough => println!("pass through"),
        Decision::Substitute { rule_id, response } => {
            println!("substitute (rule '{}')", rule_id);
            println!("status: {}", response.status);
            println!("content-type: {}", response.content_type);
            for (name, value) in &response.headers {
                println!("{}: {}", name, value);
            }
            println!();
            println!("{}", String::from_utf8_lossy(&response.body));
        }
    }

    Ok(())
}
