//! relstore CLI - DDL preview, dialect listing and connectivity checks.

use clap::{Parser, Subcommand};
use relstore::core::DefaultPolicy;
use relstore::{DialectCatalog, LogicalType, Storage, StoreConfig, StoreError, TableDefinition};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser)]
#[command(name = "relstore")]
#[command(about = "Typed record storage over SQL dialects")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, global = true, default_value = "relstore.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print CREATE TABLE for a YAML table definition
    Ddl {
        /// Path to the table definition
        #[arg(long)]
        table: PathBuf,

        /// Dialect to render for (see `relstore dialects`)
        #[arg(long, default_value = "postgres")]
        dialect: String,

        /// Render without column defaults
        #[arg(long)]
        no_defaults: bool,
    },

    /// List registered dialects in scan order
    Dialects,

    /// Connect using the configuration file and report the resolved dialect
    Check,
}

#[derive(Serialize)]
struct DialectInfo {
    product: String,
    version: String,
    dialect: String,
    types: Vec<(String, String)>,
}

#[derive(Serialize)]
struct CheckResult {
    connected: bool,
    dialect: Option<String>,
    latency_ms: u64,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StoreError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(StoreError::Config)?;

    match cli.command {
        Commands::Ddl {
            table,
            dialect,
            no_defaults,
        } => {
            let catalog = DialectCatalog::with_builtins();
            let dialect = catalog.find(&dialect).ok_or_else(|| {
                StoreError::config(format!(
                    "unknown dialect '{}' (run `relstore dialects` for the list)",
                    dialect
                ))
            })?;

            let yaml = std::fs::read_to_string(&table)?;
            let schema = TableDefinition::from_yaml(&yaml)?.into_schema()?;
            let defaults = if no_defaults {
                DefaultPolicy::none()
            } else {
                DefaultPolicy::standard()
            };
            let ddl = schema.create_table_sql(dialect.type_mapping(), &defaults)?;
            info!("Rendered {} for dialect {}", schema.name(), dialect.name());

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::json!({
                        "table": schema.name(),
                        "dialect": dialect.name(),
                        "ddl": ddl,
                    })
                );
            } else {
                println!("{}", ddl);
            }
        }
        Commands::Dialects => {
            let catalog = DialectCatalog::with_builtins();
            let mut dialects = Vec::new();
            for entry in catalog.entries() {
                let version = match (entry.major, entry.minor) {
                    (Some(major), Some(minor)) => format!("{}.{}", major, minor),
                    (Some(major), None) => major.to_string(),
                    _ => "*".to_string(),
                };
                let types = LogicalType::CONCRETE
                    .iter()
                    .map(|t| Ok((t.to_string(), entry.dialect.type_name(*t)?.to_string())))
                    .collect::<Result<Vec<_>, StoreError>>()?;
                dialects.push(DialectInfo {
                    product: entry.product.clone(),
                    version,
                    dialect: entry.dialect.name().to_string(),
                    types,
                });
            }

            if cli.output_json {
                let json = serde_json::to_string_pretty(&dialects)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                println!("{}", json);
            } else {
                for info in &dialects {
                    println!("{:<16} {:<6} {}", info.product, info.version, info.dialect);
                }
                println!("(default: {})", catalog.default_dialect().name());
            }
        }
        Commands::Check => {
            let config = StoreConfig::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);

            let started = Instant::now();
            let result = match Storage::open(&config).await {
                Ok(storage) => {
                    let dialect = storage.dialect().name().to_string();
                    storage.close().await?;
                    CheckResult {
                        connected: true,
                        dialect: Some(dialect),
                        latency_ms: started.elapsed().as_millis() as u64,
                        error: None,
                    }
                }
                Err(e) => CheckResult {
                    connected: false,
                    dialect: None,
                    latency_ms: started.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                },
            };

            if cli.output_json {
                let json = serde_json::to_string_pretty(&result)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                println!("{}", json);
            } else {
                println!("Connectivity check:");
                println!(
                    "  Database: {} ({}ms)",
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref dialect) = result.dialect {
                    println!("  Dialect: {}", dialect);
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.connected {
                return Err(StoreError::config("Connectivity check failed"));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG, when set, overrides --verbosity.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
