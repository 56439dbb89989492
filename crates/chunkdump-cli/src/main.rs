//! chunkdump CLI - consistent, chunked export planning for MySQL-protocol databases.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chunkdump::{Config, ConsistencyKind, DumpError, MysqlConnectionFactory, Orchestrator};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "chunkdump")]
#[command(about = "Consistent, chunked export planning for MySQL-protocol databases")]
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

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan chunks and print their queries without exporting data
    Plan {
        /// Override number of worker connections
        #[arg(long)]
        threads: Option<usize>,

        /// Override rows per chunk
        #[arg(long)]
        rows: Option<u64>,

        /// Override the filter applied to every chunk
        #[arg(long = "where")]
        where_clause: Option<String>,

        /// Override consistency: auto, none, flush, lock, snapshot
        #[arg(long)]
        consistency: Option<ConsistencyKind>,
    },

    /// Test the source connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), DumpError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler(cli.shutdown_timeout);

    match cli.command {
        Commands::Plan {
            threads,
            rows,
            where_clause,
            consistency,
        } => {
            if let Some(t) = threads {
                config.export.threads = Some(t);
            }
            if let Some(r) = rows {
                config.export.rows = Some(r);
            }
            if let Some(w) = where_clause {
                config.export.where_clause = Some(w);
            }
            if let Some(c) = consistency {
                config.export.consistency = c;
            }
            config.validate()?;

            let factory = Arc::new(MysqlConnectionFactory::new(&config.source));
            let orchestrator = Orchestrator::new(config, factory);
            let result = orchestrator.plan(cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                for task in &result.tasks {
                    println!("{}", task.query);
                }
                eprintln!("\nPlan completed!");
                eprintln!("  Run ID: {}", result.run_id);
                eprintln!("  Duration: {:.2}s", result.duration_seconds);
                eprintln!("  Server: {}", result.server_type);
                eprintln!("  Boundaries: {}", result.boundary_mode);
                eprintln!("  Consistency: {}", result.consistency);
                if let Some(ref snapshot) = result.snapshot {
                    eprintln!("  Snapshot: {}", snapshot);
                }
                eprintln!(
                    "  Chunks: {} over {} tables",
                    result.tasks.len(),
                    result.tables.len()
                );
            }
        }

        Commands::HealthCheck => {
            let factory = Arc::new(MysqlConnectionFactory::new(&config.source));
            let address = config.source.address();
            let orchestrator = Orchestrator::new(config, factory);
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    address,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref server) = result.server {
                    println!(
                        "    Server: {} {}",
                        server.server_type,
                        server
                            .version
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    );
                }
                if let Some(ref caps) = result.capabilities {
                    println!(
                        "    Table sample: {}, region scan: {}, snapshot: {}",
                        caps.supports_table_sample,
                        caps.supports_region_scan,
                        caps.supports_explicit_snapshot
                    );
                }
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(DumpError::connection(
                    "health check failed",
                    format!("connecting to {}", address),
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!(
                        "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
                        name, shutdown_timeout
                    );
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Ctrl-C only outside unix.
#[cfg(not(unix))]
fn setup_signal_handler(_shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    cancel_token
}
