//! One ssh invocation against one target.
//!
//! A session spawns the external ssh client with a fixed set of hardening
//! options, consumes its stdout and stderr as line streams, and signals
//! completion once both streams have closed and the process has exited.
//! Nothing that goes wrong inside a session (spawn failure, read error,
//! non-zero exit) ever aborts the rest of the batch.

use crate::models::{Channel, Event, SessionState};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Everything needed to invoke the ssh client, minus the target.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// The ssh binary to run (normally just "ssh").
    pub program: String,
    /// Remote login user.
    pub user: String,
    /// The command to execute remotely, passed as one argument.
    pub command: String,
    /// Verify host keys strictly instead of accepting new ones.
    pub strict_host_checking: bool,
}

/// What can go wrong inside a session. Logged, never propagated: a failed
/// session still completes with zero lines and the batch carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("read error on {channel}: {source}")]
    Stream {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },
}

/// Build the ssh command line for one target.
///
/// User, target, and command are discrete arguments, never concatenated
/// into a shell string, so argument semantics are identical for every
/// target. Agent forwarding is on; password, GSSAPI, and host-based
/// authentication are off.
pub fn build_command(target: &str, opts: &SessionOptions) -> Command {
    let strict = if opts.strict_host_checking { "yes" } else { "no" };

    let mut cmd = Command::new(&opts.program);
    cmd.arg("-A")
        .arg("-o")
        .arg("PasswordAuthentication=no")
        .arg("-o")
        .arg("GSSAPIAuthentication=no")
        .arg("-o")
        .arg("HostbasedAuthentication=no")
        .arg("-o")
        .arg(format!("StrictHostKeyChecking={strict}"))
        .arg("-l")
        .arg(&opts.user)
        .arg(target)
        .arg(&opts.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Run one session to completion.
///
/// `id` is the spawn index, unique within a run even when the same target
/// appears in the host list more than once. Emits `Started` first and
/// `Finished` last, exactly once each, in every outcome including spawn
/// failure.
pub async fn run(id: usize, target: String, opts: SessionOptions, events: UnboundedSender<Event>) {
    let mut state = SessionState::Pending;

    let _ = events.send(Event::Started {
        id,
        target: target.clone(),
    });
    state = state.advance();
    debug!("{target}: {state:?}");

    match build_command(&target, &opts).spawn() {
        Ok(child) => stream_child(child, &target, &events).await,
        Err(source) => {
            let err = SessionError::Spawn {
                program: opts.program.clone(),
                source,
            };
            warn!("{target}: {err}");
        }
    }

    state = state.advance();
    debug!("{target}: {state:?}");
    let _ = events.send(Event::Finished { id, target });
}

/// Drain both output channels concurrently, then reap the child.
///
/// The channels may close in either order; completion waits for both and
/// for process exit. The exit status is diagnostic only.
async fn stream_child(mut child: Child, target: &str, events: &UnboundedSender<Event>) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::join!(
        read_lines(stdout, Channel::Stdout, target, events),
        read_lines(stderr, Channel::Stderr, target, events),
    );

    match child.wait().await {
        Ok(status) => debug!("{target}: exited with {status}"),
        Err(e) => warn!("{target}: failed to reap child: {e}"),
    }
}

/// Consume one channel as a finite, in-order sequence of complete lines.
///
/// Bytes accumulate until a `\n`; `\r\n` is normalized. A trailing
/// fragment with no terminator when the stream ends is dropped — a known
/// limitation, kept as documented behavior. A read error is treated as
/// end-of-stream for this channel only.
async fn read_lines<R: AsyncRead + Unpin>(
    reader: Option<R>,
    channel: Channel,
    target: &str,
    events: &UnboundedSender<Event>,
) {
    let Some(reader) = reader else {
        return;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if !buf.ends_with(b"\n") {
                    // Stream ended mid-line; the fragment is dropped.
                    debug!("{target}: dropped unterminated fragment on {channel}");
                    break;
                }
                let content = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                let _ = events.send(Event::Line {
                    target: target.to_string(),
                    channel,
                    content,
                });
            }
            Err(source) => {
                let err = SessionError::Stream { channel, source };
                warn!("{target}: {err}");
                break;
            }
        }
    }
}

/// Strip a trailing `\n` or `\r\n`.
fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
