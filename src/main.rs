//! sshfan - run one command across many hosts over SSH, concurrently
//!
//! Spawns one ssh client per host with a bounded number of concurrent
//! sessions, interleaves the per-host output line by line, keeps a live
//! progress line, and prints aggregate statistics at the end.
//!
//! Exit codes:
//!   0 - Run completed (individual host failures do not change this)
//!   1 - Runtime error (bad arguments, unreadable host file, etc.)

mod cli;
mod config;
mod hosts;
mod launcher;
mod models;
mod progress;
mod session;
mod stats;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use is_terminal::IsTerminal;
use launcher::LaunchOptions;
use progress::Markers;
use session::SessionOptions;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    debug!("sshfan v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the batch
    match run_batch(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .sshfan.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".sshfan.toml");

    if path.exists() {
        eprintln!(".sshfan.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .sshfan.toml")?;

    println!("Created .sshfan.toml with default settings.");
    println!("Edit it to customize the ssh binary, user, and launch limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete fan-out workflow.
async fn run_batch(args: Args) -> Result<()> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Collect the target list: host file first, then -H hosts, in order.
    let mut targets = match args.hosts {
        Some(ref path) => hosts::load(path)?,
        None => Vec::new(),
    };
    targets.extend(args.host.iter().cloned());
    anyhow::ensure!(!targets.is_empty(), "target list is empty");

    let user = config
        .ssh
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .context("No login user: use --user or set it in .sshfan.toml")?;

    info!(
        "{} hosts, {} max parallel, {}ms delay",
        targets.len(),
        config.launch.max_parallel,
        config.launch.spawn_delay_ms
    );

    // Terminal interactivity is resolved once, here, and threaded through.
    let markers = Markers::for_terminal(std::io::stdout().is_terminal());
    let status_line = std::io::stderr().is_terminal();

    let opts = LaunchOptions {
        session: SessionOptions {
            program: config.ssh.program.clone(),
            user,
            command: args.command_string(),
            strict_host_checking: config.ssh.strict_host_checking,
        },
        max_parallel: config.launch.max_parallel,
        spawn_delay: Duration::from_millis(config.launch.spawn_delay_ms),
    };

    let renderer = launcher::renderer_for(
        std::io::stdout(),
        std::io::stderr(),
        markers,
        status_line,
        &targets,
    );

    let (summary, state) = launcher::launch(&targets, opts, renderer).await?;
    debug!("{}/{} sessions completed", state.completed, state.total);

    println!("{}", summary.render(&markers));
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .sshfan.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
