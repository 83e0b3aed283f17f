//! SmartLarva edge agent.
//!
//! Run with: `cargo run -p larva-agent -- --config agent.toml`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use larva_agent::config::default_config_path;
use larva_agent::{Agent, Backends, Config, SHUTDOWN_GRACE, logging};
use larva_store::{Store, StoreStats};

/// SmartLarva edge agent - capture, sync and local retention.
#[derive(Parser, Debug)]
#[command(name = "larva-agent")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Image directory (overrides config).
    #[arg(long, global = true)]
    image_dir: Option<PathBuf>,

    /// Disable the capture loop (sync, heartbeat and cleanup only).
    #[arg(long, global = true)]
    no_capture: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent in the foreground (default behavior).
    Run,

    /// Show the local upload and cleanup backlog.
    Status,

    /// Validate the configuration file and exit.
    CheckConfig,

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.command {
        Some(Command::Status) => show_status(&args),
        Some(Command::CheckConfig) => check_config(&args),
        Some(Command::Init { force }) => init_config(&args, *force),
        Some(Command::Run) | None => run_agent(&args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(db_path) = &args.database {
        config.storage.db_path = db_path.clone();
    }
    if let Some(image_dir) = &args.image_dir {
        config.storage.image_dir = image_dir.clone();
    }
    if args.no_capture {
        config.capture.enabled = false;
    }

    Ok(config)
}

async fn run_agent(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    config.validate()?;
    config.ensure_paths()?;

    logging::init(config.logging.file.as_deref())?;

    info!("Opening database at {}", config.storage.db_path.display());
    let store = Arc::new(Store::open(&config.storage.db_path)?);

    let backends = Backends::from_config(&config)?;
    info!(
        device_id = %config.device.id,
        server = %config.server.base_url,
        "Starting agent"
    );
    let handle = Agent::new(config, store, backends).start()?;

    wait_for_signal().await?;
    handle.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

fn show_status(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let store = Store::open(&config.storage.db_path)?;
    let stats = store.stats()?;

    println!("Database: {}", config.storage.db_path.display());
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &StoreStats) {
    println!(
        "Events:   {} total, {} pending metadata upload",
        stats.events_total, stats.events_pending
    );
    println!(
        "Images:   {} total, {} pending metadata, {} pending upload, {} uploaded",
        stats.images_total,
        stats.images_metadata_pending,
        stats.images_binary_pending,
        stats.images_uploaded
    );
    println!(
        "          {} corrupted, {} removed from disk",
        stats.images_corrupted, stats.images_deleted
    );
    println!(
        "Readings: {} total, {} pending upload",
        stats.readings_total, stats.readings_pending
    );
    match stats.watermark {
        Some(watermark) => println!("Watermark: event {}", watermark),
        None => println!("Watermark: none received"),
    }
}

fn config_path(args: &Args) -> PathBuf {
    args.config.clone().unwrap_or_else(default_config_path)
}

/// Validate the file as written; command-line overrides are not applied.
fn check_config(args: &Args) -> anyhow::Result<()> {
    let path = config_path(args);

    match Config::load_validated(&path) {
        Ok(_) => {
            println!("{}: configuration is valid", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

fn init_config(args: &Args, force: bool) -> anyhow::Result<()> {
    let path = config_path(args);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Set device.id and server.base_url, and add a [crate] section before capturing.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("larva-agent").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_init_writes_config_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("agent.toml");
        let path_arg = path.to_str().unwrap();

        init_config(&parse(&["--config", path_arg, "init"]), false).unwrap();
        let written = Config::load(&path).unwrap();
        assert_eq!(written.device.id, Config::default().device.id);

        let err = init_config(&parse(&["--config", path_arg, "init"]), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let args = parse(&["--config", path_arg, "init", "--force"]);
        assert!(matches!(args.command, Some(Command::Init { force: true })));
        init_config(&args, true).unwrap();
    }

    #[test]
    fn test_check_config_reports_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        let path_arg = path.to_str().unwrap();
        let args = parse(&["--config", path_arg, "check-config"]);

        // Missing file
        assert!(check_config(&args).is_err());

        // Default config has capture enabled but no crate section
        Config::default().save(&path).unwrap();
        let err = check_config(&args).unwrap_err();
        assert!(err.to_string().contains("crate"));

        let mut config = Config::default();
        config.device.id = "device-001".to_string();
        config.server.base_url = "http://localhost:8000".to_string();
        config.capture.enabled = false;
        config.save(&path).unwrap();
        check_config(&args).unwrap();
    }
}
