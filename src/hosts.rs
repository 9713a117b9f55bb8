//! Host list parsing.
//!
//! Reads a plain-text host file: one host per line, blank lines and `#`
//! comments skipped. Input order is preserved because sessions are spawned
//! in list order.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a host list from text.
///
/// Blank lines and lines starting with `#` are skipped. On each remaining
/// line, the first whitespace-separated token is the host; anything after
/// it (including trailing comments) is ignored. No deduplication is done.
pub fn parse(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .map(String::from)
        .collect()
}

/// Load a host list from a file.
///
/// An unreadable file or a file with zero usable hosts is the one fatal
/// condition of a run, so both are errors here.
pub fn load(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read host file: {}", path.display()))?;

    let hosts = parse(&content);
    if hosts.is_empty() {
        anyhow::bail!("No hosts found in {}", path.display());
    }

    Ok(hosts)
}
