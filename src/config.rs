//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.sshfan.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SSH client settings.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Launch settings.
    #[serde(default)]
    pub launch: LaunchConfig,
}

/// SSH client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// The ssh binary to invoke.
    #[serde(default = "default_program")]
    pub program: String,

    /// Remote login user. Falls back to $USER when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Verify host keys strictly instead of accepting new ones.
    #[serde(default)]
    pub strict_host_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            user: None,
            strict_host_checking: false,
        }
    }
}

fn default_program() -> String {
    "ssh".to_string()
}

/// Session launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Maximum number of simultaneously running sessions.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Delay between successive session launches, in milliseconds.
    #[serde(default = "default_spawn_delay_ms")]
    pub spawn_delay_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            spawn_delay_ms: default_spawn_delay_ms(),
        }
    }
}

fn default_max_parallel() -> usize {
    500
}

fn default_spawn_delay_ms() -> u64 {
    100
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".sshfan.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref user) = args.user {
            self.ssh.user = Some(user.clone());
        }
        if let Some(ref program) = args.ssh_program {
            self.ssh.program = program.clone();
        }
        if args.strict_host_checking {
            self.ssh.strict_host_checking = true;
        }

        if let Some(parallel) = args.parallel {
            self.launch.max_parallel = parallel;
        }
        if let Some(delay) = args.delay_ms {
            self.launch.spawn_delay_ms = delay;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
