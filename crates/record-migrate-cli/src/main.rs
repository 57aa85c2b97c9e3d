//! record-migrate CLI - reference-preserving record transfer between remote systems.

use clap::{Parser, Subcommand, ValueEnum};
use record_migrate::{
    health_check, Config, ConnectionResolver, MigrateError, RestClient, TransferMode,
    TransferOrchestrator,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "record-migrate")]
#[command(about = "Transfer records between schema-described remote systems")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
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

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Insert,
    Upsert,
}

impl From<ModeArg> for TransferMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Insert => TransferMode::Insert,
            ModeArg::Upsert => TransferMode::Upsert,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer records from the source to the target system
    Transfer {
        /// Entity type to transfer (repeatable, replaces configured entity types)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Custom extraction query (replaces configured entity types)
        #[arg(long, conflicts_with = "entities")]
        query: Option<String>,

        /// Entity type the custom query reads
        #[arg(long, requires = "query")]
        query_entity: Option<String>,

        /// How parent references are satisfied
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Records per write call (1-200)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Resolve and remap parent references
        #[arg(long)]
        include_relationships: bool,
    },

    /// List configured systems and whether their credentials resolve
    Systems,

    /// List transferable entity types in the source system
    Entities,

    /// Preview a query against the source system
    Query {
        /// Query text
        query: String,
    },

    /// Show references among the given entity types in the source system
    Analyze {
        /// Entity types to analyze
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Test source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Transfer {
            entities,
            query,
            query_entity,
            mode,
            batch_size,
            include_relationships,
        } => {
            let transfer = &mut config.transfer;
            if !entities.is_empty() {
                transfer.entity_types = entities;
                transfer.custom_query = None;
                transfer.custom_query_entity = None;
            }
            if let Some(query) = query {
                transfer.entity_types.clear();
                transfer.custom_query = Some(query);
                transfer.custom_query_entity = query_entity;
            }
            if let Some(mode) = mode {
                transfer.mode = mode.into();
            }
            if let Some(size) = batch_size {
                transfer.batch_size = size;
            }
            if include_relationships {
                transfer.include_relationships = true;
            }
            config.validate()?;

            let orchestrator = TransferOrchestrator::from_config(&config, &config.resolver()).await?;
            let result = orchestrator.transfer(&config.transfer).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!(
                    "\n{}",
                    if result.success {
                        "Transfer completed!"
                    } else {
                        "Transfer completed with errors"
                    }
                );
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Records: {}", result.records_transferred);
                for entity in &result.entities {
                    println!(
                        "    {}: {}/{} transferred, {} failed{}",
                        entity.entity,
                        entity.transferred,
                        entity.extracted,
                        entity.failed,
                        if entity.complete { "" } else { " (first page only)" }
                    );
                }
                if !result.errors.is_empty() {
                    println!("  Errors:");
                    for error in &result.errors {
                        println!("    - {}", error);
                    }
                }
            }

            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Systems => {
            let resolver = config.resolver();
            let systems: Vec<_> = resolver
                .list_available_systems()
                .into_iter()
                .map(|name| {
                    let endpoint = config
                        .systems
                        .get(&name)
                        .map(|s| s.endpoint_url.clone())
                        .unwrap_or_default();
                    let credential = resolver.resolve_connection(&name).err().map(|e| e.to_string());
                    (name, endpoint, credential)
                })
                .collect();

            if cli.output_json {
                let entries: Vec<_> = systems
                    .iter()
                    .map(|(name, endpoint, credential)| {
                        json!({
                            "name": name,
                            "endpoint_url": endpoint,
                            "credential_ok": credential.is_none(),
                            "credential_error": credential,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Configured systems:");
                for (name, endpoint, credential) in &systems {
                    let status = match credential {
                        None => "OK".to_string(),
                        Some(err) => format!("UNAVAILABLE ({})", err),
                    };
                    println!("  {}  {}  {}", name, endpoint, status);
                }
            }
        }

        Commands::Entities => {
            let orchestrator = TransferOrchestrator::from_config(&config, &config.resolver()).await?;
            let names = orchestrator.list_entity_types().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in &names {
                    println!("{}", name);
                }
            }
        }

        Commands::Query { query } => {
            let orchestrator = TransferOrchestrator::from_config(&config, &config.resolver()).await?;
            let preview = orchestrator.run_query(&query).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                println!(
                    "{} of {} record(s){}",
                    preview.records.len(),
                    preview.total_available,
                    if preview.is_complete { "" } else { " (first page only)" }
                );
                for record in &preview.records {
                    println!("{}", serde_json::to_string(record)?);
                }
            }
        }

        Commands::Analyze { entities } => {
            let orchestrator = TransferOrchestrator::from_config(&config, &config.resolver()).await?;
            let related = orchestrator.analyze_relationships(&entities).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&related)?);
            } else {
                for (entity, parents) in &related {
                    if parents.is_empty() {
                        println!("{}: (no references within the given types)", entity);
                    } else {
                        println!("{} -> {}", entity, parents.join(", "));
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let resolver = config.resolver();
            let source = resolver.resolve_connection(&config.transfer.source)?;
            let target = resolver.resolve_connection(&config.transfer.target)?;
            let source = RestClient::new(&source, &config.client)?;
            let target = RestClient::new(&target, &config.client)?;

            let result = health_check(&source, &target).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                for (label, side) in [
                    (format!("Source ({})", config.transfer.source), &result.source),
                    (format!("Target ({})", config.transfer.target), &result.target),
                ] {
                    println!(
                        "  {}: {} ({}ms)",
                        label,
                        if side.connected { "OK" } else { "FAILED" },
                        side.latency_ms
                    );
                    if let Some(ref err) = side.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health-check",
                    "one or both systems are unreachable",
                ));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
