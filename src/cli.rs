//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// sshfan - run one command across many hosts over SSH, concurrently
///
/// Reads a host list, fans the command out with a bounded number of
/// concurrent ssh sessions, interleaves the per-host output line by line,
/// and prints aggregate statistics at the end.
///
/// Examples:
///   sshfan -f hosts.txt -- uptime
///   sshfan -f hosts.txt -l deploy -p 50 -- systemctl is-active nginx
///   sshfan -H web1 -H web2 -- "df -h /"
///   sshfan --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// File with one host per line
    ///
    /// Blank lines and `#` comments are skipped. Hosts are contacted in
    /// file order.
    #[arg(short = 'f', long = "hosts", value_name = "FILE")]
    pub hosts: Option<PathBuf>,

    /// Additional host given directly (repeatable)
    ///
    /// Appended after the hosts from --hosts, in the order given.
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: Vec<String>,

    /// Remote login user
    ///
    /// Defaults to the config file setting, then $USER.
    #[arg(short = 'l', long, value_name = "USER", env = "SSHFAN_USER")]
    pub user: Option<String>,

    /// Maximum number of concurrent sessions
    ///
    /// Default: from config or 500.
    #[arg(short = 'p', long, value_name = "NUM")]
    pub parallel: Option<usize>,

    /// Delay between session launches in milliseconds
    ///
    /// Default: from config or 100.
    #[arg(long = "delay", value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Verify host keys strictly instead of accepting new ones
    #[arg(long)]
    pub strict_host_checking: bool,

    /// The ssh binary to invoke
    #[arg(long = "ssh", value_name = "PATH")]
    pub ssh_program: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .sshfan.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .sshfan.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// The command to run on every host
    ///
    /// Everything after the options (use `--` to be explicit). The words
    /// are joined with spaces and passed to ssh as a single argument.
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The opaque command string passed to every session.
    pub fn command_string(&self) -> String {
        self.command.join(" ")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.hosts.is_none() && self.host.is_empty() {
            return Err("No hosts given: use --hosts FILE or -H HOST".to_string());
        }

        if self.command.is_empty() {
            return Err("No command given".to_string());
        }

        if let Some(parallel) = self.parallel {
            if parallel == 0 {
                return Err("Parallelism must be at least 1".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// The default is WARN rather than INFO: the remote output stream is
    /// the primary output of this tool and should not compete with logs.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
    }
}
