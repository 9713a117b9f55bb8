//! Bounded concurrent session launch.
//!
//! Spawns one session per target in list order, paced by a fixed delay and
//! throttled by a semaphore sized to the concurrency ceiling. All sessions
//! feed one consumer task through a single event queue; the consumer owns
//! the renderer, the stats aggregator, and the per-session lifecycle map,
//! so display and counters are mutated from exactly one place.

use crate::models::{Event, SessionState};
use crate::progress::{Markers, ProgressRenderer, ProgressState};
use crate::session::{self, SessionOptions};
use crate::stats::{StatsAggregator, Summary};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub session: SessionOptions,
    /// Maximum number of simultaneously running sessions.
    pub max_parallel: usize,
    /// Pacing delay after each spawn.
    pub spawn_delay: Duration,
}

/// Build a renderer sized to the target list.
pub fn renderer_for<O: Write, E: Write>(
    out: O,
    err: E,
    markers: Markers,
    status_line: bool,
    targets: &[String],
) -> ProgressRenderer<O, E> {
    let width = targets.iter().map(String::len).max().unwrap_or(0);
    ProgressRenderer::new(
        out,
        err,
        markers,
        status_line,
        ProgressState::new(targets.len(), width),
    )
}

/// Launch every target and wait for all sessions to finish.
///
/// Completion order is independent of spawn order; a session that fails to
/// spawn still counts as completed. The only fatal condition is an empty
/// target list.
pub async fn launch<O, E>(
    targets: &[String],
    opts: LaunchOptions,
    renderer: ProgressRenderer<O, E>,
) -> Result<(Summary, ProgressState)>
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    anyhow::ensure!(!targets.is_empty(), "target list is empty");
    anyhow::ensure!(opts.max_parallel >= 1, "concurrency ceiling must be at least 1");

    let (tx, rx) = mpsc::unbounded_channel();
    let consumer = tokio::spawn(consume_events(rx, renderer));

    let limiter = Arc::new(Semaphore::new(opts.max_parallel));
    let mut sessions = JoinSet::new();

    for (id, target) in targets.iter().enumerate() {
        // Holding a permit for the session's whole lifetime bounds the
        // number of running sessions to the ceiling.
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .context("session limiter closed")?;

        let target = target.clone();
        let session_opts = opts.session.clone();
        let events = tx.clone();
        sessions.spawn(async move {
            session::run(id, target, session_opts, events).await;
            drop(permit);
        });

        tokio::time::sleep(opts.spawn_delay).await;
    }

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            warn!("session task panicked: {e}");
        }
    }

    // Closing the queue lets the consumer drain and finish.
    drop(tx);
    consumer.await.context("event consumer failed")
}

/// Single consumer of all session events.
///
/// Serializing display and counter updates here is what keeps concurrent
/// emitters from ever interleaving a record mid-line.
async fn consume_events<O: Write, E: Write>(
    mut rx: UnboundedReceiver<Event>,
    mut renderer: ProgressRenderer<O, E>,
) -> (Summary, ProgressState) {
    let mut stats = StatsAggregator::default();
    // Keyed by spawn id, not target name: duplicate targets in the host
    // list run as independent sessions and must complete independently.
    let mut states: HashMap<usize, SessionState> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            Event::Started { id, .. } => {
                states.insert(id, SessionState::Pending.advance());
                renderer.session_started();
            }
            Event::Line {
                target,
                channel,
                content,
            } => {
                stats.record(&target, channel);
                renderer.line(&target, channel, &content);
            }
            Event::Finished { id, target } => match states.get(&id).copied() {
                Some(state) if !state.is_terminal() => {
                    states.insert(id, state.advance());
                    renderer.session_finished();
                }
                other => debug!("{target}: spurious Finished in state {other:?}"),
            },
        }
    }

    (stats.summary(), renderer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn options(program: &str) -> LaunchOptions {
        LaunchOptions {
            session: SessionOptions {
                program: program.to_string(),
                user: "deploy".to_string(),
                command: "uptime".to_string(),
                strict_host_checking: false,
            },
            max_parallel: 4,
            spawn_delay: Duration::ZERO,
        }
    }

    // The renderer is moved into the consumer task, so tests capture its
    // output through shared buffers.
    #[derive(Clone, Default)]
    struct Shared(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    async fn run(
        hosts: &[String],
        opts: LaunchOptions,
        status_line: bool,
    ) -> Result<(Summary, ProgressState, Vec<u8>, Vec<u8>)> {
        let out = Shared::default();
        let err = Shared::default();
        let renderer = renderer_for(out.clone(), err.clone(), Markers::plain(), status_line, hosts);
        let (summary, state) = launch(hosts, opts, renderer).await?;
        Ok((summary, state, out.contents(), err.contents()))
    }

    #[tokio::test]
    async fn test_empty_target_list_rejected() {
        let renderer = renderer_for(Vec::new(), Vec::new(), Markers::plain(), false, &[]);
        let result = launch(&[], options("echo"), renderer).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_sessions_complete() {
        let hosts = targets(&["a", "b", "c"]);
        let (summary, state, out, _) = run(&hosts, options("echo"), false).await.unwrap();

        // `echo` prints the whole ssh argv as one stdout line per target.
        assert_eq!(state.completed, 3);
        assert_eq!(state.active, 0);
        assert_eq!(summary.hosts_with_stdout, 3);
        assert_eq!(summary.stdout_lines, 3);
        assert_eq!(summary.hosts_with_stderr, 0);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_spawn_failure_never_aborts_batch() {
        let hosts = targets(&["a", "b", "c", "d"]);
        let (summary, state, out, _) = run(&hosts, options("/nonexistent/ssh-client"), false)
            .await
            .unwrap();

        assert_eq!(state.completed, hosts.len());
        assert_eq!(summary, Summary::default());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_one_is_sequential() {
        let hosts = targets(&["a", "b", "c"]);
        let mut opts = options("echo");
        opts.max_parallel = 1;
        opts.spawn_delay = Duration::from_millis(20);

        let start = Instant::now();
        let (_, state, _, _) = run(&hosts, opts, false).await.unwrap();

        assert_eq!(state.completed, 3);
        // One pacing delay per spawn.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_concurrent_records_stay_contiguous() {
        // Many fast-completing sessions racing into the display.
        let hosts: Vec<String> = (0..40).map(|i| format!("host{i:02}")).collect();
        let mut opts = options("echo");
        opts.max_parallel = 16;

        let (summary, state, out, _) = run(&hosts, opts, false).await.unwrap();

        assert_eq!(state.completed, 40);
        assert_eq!(summary.stdout_lines, 40);

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 40);
        for line in lines {
            // Every record is one unbroken `<target padded> -> <argv>` unit.
            assert!(line.starts_with("host"), "corrupted record: {line}");
            assert_eq!(&line[6..10], " -> ", "corrupted record: {line}");
        }
    }

    #[tokio::test]
    async fn test_mixed_output_aggregation() {
        // `ls` over the ssh argv treats every option value as a missing
        // path, producing stderr lines and nothing on stdout.
        let hosts = targets(&["only-errors"]);
        let mut opts = options("ls");
        opts.session.command = "/nonexistent/path/for/sshfan-test".to_string();

        let (summary, state, out, err) = run(&hosts, opts, false).await.unwrap();

        assert_eq!(state.completed, 1);
        assert!(out.is_empty());
        assert_eq!(summary.hosts_with_stdout, 0);
        assert_eq!(summary.hosts_with_stderr, 1);
        assert!(summary.stderr_lines >= 1);
        assert!(!err.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_targets_complete_independently() {
        // Two overlapping sessions for the same target name must not share
        // lifecycle state: both completions count.
        let hosts = targets(&["b", "a", "b"]);
        let renderer = renderer_for(Vec::new(), Vec::new(), Markers::plain(), false, &hosts);
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume_events(rx, renderer));

        // The interleaving two concurrent "b" sessions produce.
        for event in [
            Event::Started { id: 0, target: "b".to_string() },
            Event::Started { id: 1, target: "a".to_string() },
            Event::Started { id: 2, target: "b".to_string() },
            Event::Finished { id: 1, target: "a".to_string() },
            Event::Finished { id: 0, target: "b".to_string() },
            Event::Finished { id: 2, target: "b".to_string() },
        ] {
            tx.send(event).unwrap();
        }
        drop(tx);

        let (_, state) = consumer.await.unwrap();
        assert_eq!(state.completed, state.total);
        assert_eq!(state.active, 0);
    }

    #[tokio::test]
    async fn test_duplicate_targets_end_to_end() {
        let hosts = targets(&["b", "a", "b"]);
        let (summary, state, _, _) = run(&hosts, options("echo"), false).await.unwrap();

        assert_eq!(state.completed, 3);
        assert_eq!(state.active, 0);
        // Lines from both "b" sessions land in one per-target tally.
        assert_eq!(summary.hosts_with_stdout, 2);
        assert_eq!(summary.stdout_lines, 3);
    }

    #[tokio::test]
    async fn test_active_never_exceeds_ceiling() {
        use std::os::unix::fs::PermissionsExt;

        // A stub client that ignores the ssh argv and blocks long enough
        // for the sessions to pile up against the ceiling.
        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("slow-client.sh");
        std::fs::write(&stub, "#!/bin/sh\nsleep 0.1\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let hosts: Vec<String> = (0..8).map(|i| format!("host{i}")).collect();
        let mut opts = options(stub.to_str().unwrap());
        opts.max_parallel = 3;

        // Status line on: every update reports the active count.
        let (_, state, _, err) = run(&hosts, opts, true).await.unwrap();
        assert_eq!(state.completed, 8);

        let err = String::from_utf8(err).unwrap();
        let mut peak = 0;
        for chunk in err.split("% complete, ").skip(1) {
            let active = chunk
                .split(" active")
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .expect("malformed status line");
            peak = peak.max(active);
        }
        assert!(peak >= 2, "sessions never overlapped (peak {peak})");
        assert!(peak <= 3, "ceiling exceeded (peak {peak})");
    }
}
