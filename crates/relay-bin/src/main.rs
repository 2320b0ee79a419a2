//! webhook-relay binary entry point.
//!
//! Usage: webhook-relay [OPTIONS] [serve | status [QUEUE] | drain [QUEUE]]

use clap::{Parser, Subcommand};
use relay_bin::{relay, RelayResult};
use relay_config::{init_logging_for_service, Config, Paths};
use std::path::PathBuf;
use tracing::{error, info};

/// Durable retry relay for inbound webhooks.
#[derive(Parser, Debug)]
#[command(name = "webhook-relay")]
#[command(about = "Durable retry queue that forwards webhooks to a downstream endpoint")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, database and logs.
    #[arg(long, env = "RELAY_BASE_DIR", global = true)]
    base_dir: Option<PathBuf>,

    /// Address the HTTP gateway binds to.
    #[arg(long, global = true)]
    listen: Option<String>,

    /// SQLite database file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Destination URL events are forwarded to.
    #[arg(long, global = true)]
    destination: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server (default).
    Serve,
    /// Print a queue's length, head and next wake time.
    Status {
        /// Queue name; defaults to the configured default queue.
        queue: Option<String>,
    },
    /// Run one drain pass on a queue.
    Drain {
        /// Queue name; defaults to the configured default queue.
        queue: Option<String>,
    },
}

fn load(args: &Args) -> RelayResult<(Config, Paths)> {
    let paths = match &args.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    if let Some(database) = &args.database {
        config.database_path = Some(database.clone());
    }
    if let Some(destination) = &args.destination {
        config.destination_url = Some(destination.clone());
    }
    config.validate()?;

    Ok((config, paths))
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    let args = Args::parse();
    let (config, paths) = load(&args)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_logging_for_service("webhook-relay", &config.log_level, Some(paths.log_file()));
            info!(
                listen = %config.listen_addr,
                database = %config.database_path(&paths).display(),
                destination = config.destination_url.as_deref().unwrap_or("<none>"),
                default_queue = %config.default_queue,
                "Relay starting"
            );

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
                info!("Received shutdown signal, exiting...");
            };

            if let Err(e) = relay::serve(config, paths, shutdown).await {
                error!(error = %e, "Relay exited with error");
                return Err(e);
            }
        }
        Command::Status { queue } => {
            init_logging_for_service("webhook-relay-cli", &config.log_level, None);
            let status = relay::status_once(&config, &paths, queue).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Drain { queue } => {
            init_logging_for_service("webhook-relay-cli", &config.log_level, None);
            let report = relay::drain_once(&config, &paths, queue).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
