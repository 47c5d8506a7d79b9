//! Bazaar CLI

use anyhow::{Context, Result};
use bazaar_config::{build_registry, load_config, Config};
use bazaar_router::{PathPattern, ServiceRegistry};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(about = "Bazaar gateway routing core", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "BAZAAR_CONFIG",
        default_value = "config/marketplace.yaml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log output format; defaults to the config file
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Validate,

    /// Print the route table in resolution order
    Routes,

    /// Resolve a request path to its service
    Resolve {
        /// Request path, e.g. /api/v1/hotels/42
        path: String,
    },

    /// Probe every service and print the results as JSON
    Health,

    /// Probe every service and print the registry snapshot as JSON
    Stats,

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("Bazaar gateway");
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
        return Ok(());
    }

    // Logging defaults come from the file, so read it before validating
    let raw = bazaar_config::load(&cli.config).ok();
    let logging = raw.map(|c| c.observability.logging).unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    let format = match cli.log_format {
        Some(format) => format,
        None if logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_tracing(level, format)?;

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), "Configuration is invalid: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Validate => validate(&cli.config, &config),
        Commands::Routes => {
            let registry = build_registry(&config)?;
            print_routes(&registry);
            Ok(())
        }
        Commands::Resolve { path } => {
            let registry = build_registry(&config)?;
            match registry.resolve(&path) {
                Ok(route) => {
                    println!("service:  {}", route.service_id());
                    println!("pattern:  {}", route.pattern);
                    println!("captures: {:?}", route.captures);
                    println!("upstream: {}", route.upstream_url(&path));
                    for (name, value) in route.headers() {
                        println!("header:   {name}: {value}");
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Health => {
            let registry = build_registry(&config)?;
            let results = registry.refresh_all_health().await;
            println!("{}", serde_json::to_string_pretty(&results)?);
            registry.shutdown();
            Ok(())
        }
        Commands::Stats => {
            let registry = build_registry(&config)?;
            registry.refresh_all_health().await;
            println!("{}", serde_json::to_string_pretty(&registry.stats())?);
            registry.shutdown();
            Ok(())
        }
        Commands::Version => Ok(()),
    }
}

fn validate(path: &Path, config: &Config) -> Result<()> {
    tracing::info!("Configuration is valid: {}", path.display());
    tracing::info!("  Services: {}", config.services.len());
    tracing::info!("  Default breaker: {}", config.circuit_breaker.name());

    for service in &config.services {
        for pattern in &service.patterns {
            if let Err(e) = PathPattern::new(pattern.as_str()).compile() {
                tracing::warn!(service = %service.id, "{e}");
            }
        }
    }

    config
        .service_descriptors()
        .context("service definitions are invalid")?;
    Ok(())
}

fn print_routes(registry: &ServiceRegistry) {
    for (position, service) in registry.list_services().iter().enumerate() {
        let descriptor = &service.descriptor;
        println!(
            "{:>2}. {} ({}) -> {}",
            position + 1,
            descriptor.id,
            descriptor.name,
            descriptor.base_url
        );
        for pattern in &descriptor.patterns {
            println!("      {pattern}");
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log level")?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    Ok(())
}
