//! Live progress rendering.
//!
//! Per-line records go to the destination matching their channel, prefixed
//! with the right-padded target name and a directional marker. On an
//! interactive terminal a single status line is kept at the bottom of the
//! diagnostic stream and redrawn after every record.
//!
//! The renderer itself is not synchronized: it is owned by the launcher's
//! single event consumer, so every erase/print/redraw sequence runs as one
//! uninterrupted critical section.

use crate::models::Channel;
use self::ansi::ERASE_LINE;
use std::io::Write;

mod ansi {
    /// Return to column 0 and clear to end of line.
    pub const ERASE_LINE: &str = "\r\x1b[K";
}

/// Channel markers, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub stdout: &'static str,
    pub stderr: &'static str,
}

impl Markers {
    /// Unicode arrows for interactive terminals.
    pub fn fancy() -> Self {
        Markers { stdout: "→", stderr: "⇒" }
    }

    /// ASCII fallback for pipes and files.
    pub fn plain() -> Self {
        Markers { stdout: "->", stderr: "=>" }
    }

    /// Pick markers for the given terminal interactivity.
    pub fn for_terminal(interactive: bool) -> Self {
        if interactive {
            Self::fancy()
        } else {
            Self::plain()
        }
    }

    /// The marker for one channel.
    pub fn marker(&self, channel: Channel) -> &'static str {
        match channel {
            Channel::Stdout => self.stdout,
            Channel::Stderr => self.stderr,
        }
    }
}

/// Shared run counters driving the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    /// Total number of targets in the run.
    pub total: usize,
    /// Sessions currently running.
    pub active: usize,
    /// Sessions that have completed.
    pub completed: usize,
    /// Length of the longest target name, for column alignment.
    pub width: usize,
}

impl ProgressState {
    pub fn new(total: usize, width: usize) -> Self {
        ProgressState {
            total,
            active: 0,
            completed: 0,
            width,
        }
    }

    /// Completion percentage. `total` must be non-zero; the launcher
    /// rejects empty target lists before any state is built.
    pub fn percent(&self) -> usize {
        self.completed * 100 / self.total
    }
}

/// Writes line records and maintains the status line.
///
/// Generic over the two sinks so tests can capture output in memory; the
/// real run uses stdout and stderr.
pub struct ProgressRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    markers: Markers,
    /// Draw the live status line (stderr is an interactive terminal).
    status_line: bool,
    status_drawn: bool,
    state: ProgressState,
}

impl<O: Write, E: Write> ProgressRenderer<O, E> {
    pub fn new(out: O, err: E, markers: Markers, status_line: bool, state: ProgressState) -> Self {
        ProgressRenderer {
            out,
            err,
            markers,
            status_line,
            status_drawn: false,
            state,
        }
    }

    /// A session entered `Running`.
    pub fn session_started(&mut self) {
        self.state.active += 1;
        self.redraw_status();
    }

    /// A session reached `Completed`.
    pub fn session_finished(&mut self) {
        self.state.active = self.state.active.saturating_sub(1);
        self.state.completed += 1;
        self.redraw_status();
    }

    /// Print one line record: erase the status line, write
    /// `<target padded to width+1><marker> <content>` to the sink matching
    /// the channel, then redraw the status line.
    pub fn line(&mut self, target: &str, channel: Channel, content: &str) {
        self.erase_status();

        let width = self.state.width + 1;
        let marker = self.markers.marker(channel);
        let record = format!("{target:<width$}{marker} {content}");

        match channel {
            Channel::Stdout => {
                let _ = writeln!(self.out, "{record}");
                let _ = self.out.flush();
            }
            Channel::Stderr => {
                let _ = writeln!(self.err, "{record}");
            }
        }

        self.redraw_status();
    }

    /// Clear the status line and return the final counters.
    pub fn finish(mut self) -> ProgressState {
        self.erase_status();
        let _ = self.err.flush();
        let _ = self.out.flush();
        self.state
    }

    fn erase_status(&mut self) {
        if self.status_drawn {
            let _ = write!(self.err, "{ERASE_LINE}");
            self.status_drawn = false;
        }
    }

    fn redraw_status(&mut self) {
        if !self.status_line {
            return;
        }
        self.erase_status();
        let s = &self.state;
        let _ = write!(
            self.err,
            "[{}/{}] {}% complete, {} active",
            s.completed,
            s.total,
            s.percent(),
            s.active
        );
        let _ = self.err.flush();
        self.status_drawn = true;
    }
}
