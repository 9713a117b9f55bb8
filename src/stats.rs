//! Per-target and global output statistics.
//!
//! Every line a session emits is tallied here, per target and per channel.
//! At the end of a run the aggregator condenses the tallies into the six
//! summary numbers printed on the final line.

use crate::models::Channel;
use crate::progress::Markers;
use std::collections::HashMap;

/// Line counts for one target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetTally {
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

impl TargetTally {
    /// Total lines across both channels.
    pub fn total(&self) -> usize {
        self.stdout_lines + self.stderr_lines
    }
}

/// Accumulates line counts from every session in a run.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    tallies: HashMap<String, TargetTally>,
}

impl StatsAggregator {
    /// Count one line from `target` on `channel`.
    pub fn record(&mut self, target: &str, channel: Channel) {
        let tally = self.tallies.entry(target.to_string()).or_default();
        match channel {
            Channel::Stdout => tally.stdout_lines += 1,
            Channel::Stderr => tally.stderr_lines += 1,
        }
    }

    /// Tally for a single target, if it produced any output.
    #[allow(dead_code)] // Utility accessor, exercised by tests
    pub fn tally(&self, target: &str) -> Option<&TargetTally> {
        self.tallies.get(target)
    }

    /// Condense the tallies into the final summary.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();

        for tally in self.tallies.values() {
            if tally.total() > 0 {
                summary.hosts_with_output += 1;
                summary.output_lines += tally.total();
            }
            if tally.stdout_lines > 0 {
                summary.hosts_with_stdout += 1;
                summary.stdout_lines += tally.stdout_lines;
            }
            if tally.stderr_lines > 0 {
                summary.hosts_with_stderr += 1;
                summary.stderr_lines += tally.stderr_lines;
            }
        }

        summary
    }
}

/// The six aggregate counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Targets that produced at least one line on either channel.
    pub hosts_with_output: usize,
    /// Total lines among those targets.
    pub output_lines: usize,
    /// Targets that produced standard output.
    pub hosts_with_stdout: usize,
    pub stdout_lines: usize,
    /// Targets that produced diagnostic output.
    pub hosts_with_stderr: usize,
    pub stderr_lines: usize,
}

impl Summary {
    /// Render the summary as one line, in the same directional-marker
    /// style as per-line records.
    pub fn render(&self, markers: &Markers) -> String {
        format!(
            "{} hosts / {} lines, {} {} hosts / {} lines, {} {} hosts / {} lines",
            self.hosts_with_output,
            self.output_lines,
            markers.stdout,
            self.hosts_with_stdout,
            self.stdout_lines,
            markers.stderr,
            self.hosts_with_stderr,
            self.stderr_lines,
        )
    }
}
