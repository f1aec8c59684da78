//! Script execution with live output.
//!
//! [`ScriptRunner::run`] executes a sequence of shell scripts one after
//! another and returns an [`ExecStream`]: every stdout/stderr line as it is
//! read, then exactly one [`ExecEvent::Finished`].
//!
//! Per script, one reader task per pipe forwards lines into the session's
//! channel. Lines from the two pipes interleave in reader order, which may
//! differ from the order the script wrote them. The exit status is collected
//! only after both readers have reached end-of-stream.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::settings::DEFAULT_SHELL;

const EVENT_BUFFER: usize = 64;

/// Longest line forwarded as one event; longer lines are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecEvent {
    Stdout {
        line: String,
    },
    Stderr {
        line: String,
    },
    Finished {
        status: ExecStatus,
        duration_seconds: f64,
    },
}

/// Final outcome of one execution session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    /// The last (or only) script exited non-zero. `-1` when killed by a signal.
    Failed { exit_code: i32 },
    /// Script number `after_action` (1-based) exited non-zero and the
    /// remaining scripts were skipped.
    Aborted { after_action: usize, exit_code: i32 },
    SpawnFailed { reason: String },
    /// Reading one of the output pipes failed mid-stream.
    StreamFailed { reason: String },
}

impl ExecStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecStatus::Success)
    }

    /// Exit code a CLI should mirror for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecStatus::Success => 0,
            ExecStatus::Failed { exit_code } | ExecStatus::Aborted { exit_code, .. } => {
                if *exit_code > 0 {
                    *exit_code
                } else {
                    1
                }
            }
            ExecStatus::SpawnFailed { .. } => 127,
            ExecStatus::StreamFailed { .. } => 1,
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecStatus::Success => write!(f, "success"),
            ExecStatus::Failed { exit_code } => write!(f, "exit code {exit_code}"),
            ExecStatus::Aborted { after_action, .. } => {
                write!(f, "aborted after action {after_action}")
            }
            ExecStatus::SpawnFailed { reason } => write!(f, "spawn failed: {reason}"),
            ExecStatus::StreamFailed { reason } => write!(f, "stream failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecStream
// ---------------------------------------------------------------------------

/// Live, finite feed of one session's events. Dropping it disconnects the
/// session: its reader tasks stop at their next send.
pub struct ExecStream {
    rx: mpsc::Receiver<ExecEvent>,
}

impl Stream for ExecStream {
    type Item = ExecEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// ScriptRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: PathBuf,
    cwd: Option<PathBuf>,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

/// How one script ended.
#[derive(Debug, PartialEq)]
enum Outcome {
    Exited(i32),
    SpawnFailed(String),
    StreamFailed(String),
    Disconnected,
}

/// How one reader task ended.
#[derive(Debug, PartialEq)]
enum ReaderEnd {
    Eof,
    Failed(String),
    Disconnected,
}

impl ScriptRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Start a session running `scripts` in order. Must be called from within
    /// a Tokio runtime.
    pub fn run(&self, scripts: Vec<String>) -> ExecStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let runner = self.clone();
        tokio::spawn(async move { runner.run_session(scripts, tx).await });
        ExecStream { rx }
    }

    async fn run_session(self, scripts: Vec<String>, tx: mpsc::Sender<ExecEvent>) {
        let start = Instant::now();
        let total = scripts.len();
        let mut status = ExecStatus::Success;

        for (idx, script) in scripts.iter().enumerate() {
            let position = idx + 1;
            if tx.is_closed() {
                debug!(position, "output receiver gone, abandoning session");
                return;
            }
            info!(position, total, "running script");

            match next_step(self.run_one(script, &tx).await, position, total) {
                Step::Continue => continue,
                Step::Stop(final_status) => {
                    status = final_status;
                    break;
                }
                Step::Abandon => {
                    debug!(position, "output receiver gone, abandoning session");
                    return;
                }
            }
        }

        let duration_seconds = start.elapsed().as_secs_f64();
        info!(status = %status, duration_seconds, "session finished");
        let _ = tx
            .send(ExecEvent::Finished {
                status,
                duration_seconds,
            })
            .await;
    }

    async fn run_one(&self, script: &str, tx: &mpsc::Sender<ExecEvent>) -> Outcome {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return Outcome::SpawnFailed(format!(
                    "failed to spawn '{}': {e}",
                    self.shell.display()
                ))
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Outcome::SpawnFailed("failed to capture output pipes".into());
        };

        let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone(), |line| {
            ExecEvent::Stdout { line }
        }));
        let stderr_task = tokio::spawn(forward_lines(stderr, tx.clone(), |line| {
            ExecEvent::Stderr { line }
        }));

        // Both pipes must be drained before the exit status is reported.
        let (out_end, err_end) = tokio::join!(stdout_task, stderr_task);
        let ends = [out_end, err_end].map(|joined| {
            joined.unwrap_or_else(|e| ReaderEnd::Failed(format!("reader task failed: {e}")))
        });

        if let Some(outcome) = settle_readers(ends) {
            // The child is left running; tokio reaps it once it exits.
            if matches!(outcome, Outcome::Disconnected) {
                debug!(pid = child.id(), "abandoning script after disconnect");
            }
            return outcome;
        }

        let waited = tokio::select! {
            waited = child.wait() => waited,
            _ = tx.closed() => return Outcome::Disconnected,
        };
        match waited {
            Ok(status) => Outcome::Exited(status.code().unwrap_or(-1)),
            Err(e) => Outcome::StreamFailed(format!("wait failed: {e}")),
        }
    }
}

/// What the session does after one script.
#[derive(Debug, PartialEq)]
enum Step {
    Continue,
    Stop(ExecStatus),
    Abandon,
}

fn next_step(outcome: Outcome, position: usize, total: usize) -> Step {
    match outcome {
        Outcome::Exited(0) => Step::Continue,
        Outcome::Exited(exit_code) => {
            warn!(position, total, exit_code, "script failed");
            Step::Stop(if position < total {
                ExecStatus::Aborted {
                    after_action: position,
                    exit_code,
                }
            } else {
                ExecStatus::Failed { exit_code }
            })
        }
        Outcome::SpawnFailed(reason) => {
            warn!(position, reason = %reason, "script could not be started");
            Step::Stop(ExecStatus::SpawnFailed { reason })
        }
        Outcome::StreamFailed(reason) => {
            warn!(position, reason = %reason, "reading script output failed");
            Step::Stop(ExecStatus::StreamFailed { reason })
        }
        Outcome::Disconnected => Step::Abandon,
    }
}

/// Combine the two reader results. `None` means both reached end-of-stream.
fn settle_readers(ends: [ReaderEnd; 2]) -> Option<Outcome> {
    if ends.iter().any(|e| matches!(e, ReaderEnd::Disconnected)) {
        return Some(Outcome::Disconnected);
    }
    ends.into_iter().find_map(|e| match e {
        ReaderEnd::Failed(reason) => Some(Outcome::StreamFailed(reason)),
        _ => None,
    })
}

/// Forward `reader` line by line until end-of-stream, a read error, or the
/// receiver going away. The receiver is watched while waiting for output, so
/// a silent script does not pin the reader after a disconnect.
async fn forward_lines<R, F>(reader: R, tx: mpsc::Sender<ExecEvent>, wrap: F) -> ReaderEnd
where
    R: AsyncRead + Unpin,
    F: Fn(String) -> ExecEvent,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        // Lines longer than MAX_LINE_BYTES come out in several pieces.
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut buf) => read,
            _ = tx.closed() => return ReaderEnd::Disconnected,
        };
        match read {
            Ok(0) => return ReaderEnd::Eof,
            Ok(_) => {
                if tx.send(wrap(decode_line(&buf))).await.is_err() {
                    return ReaderEnd::Disconnected;
                }
            }
            Err(e) => return ReaderEnd::Failed(e.to_string()),
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt as _;

    fn runner() -> ScriptRunner {
        ScriptRunner::new("/bin/sh")
    }

    fn scripts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Collect every event of a session, failing if it does not end in time.
    async fn collect(stream: ExecStream) -> Vec<ExecEvent> {
        tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>())
            .await
            .expect("timed out waiting for session to finish")
    }

    fn final_status(events: &[ExecEvent]) -> &ExecStatus {
        match events.last() {
            Some(ExecEvent::Finished { status, .. }) => status,
            other => panic!("last event is not Finished: {other:?}"),
        }
    }

    fn lines(events: &[ExecEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                ExecEvent::Stdout { line } | ExecEvent::Stderr { line } => Some(line.as_str()),
                ExecEvent::Finished { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn echo_yields_one_line_then_success() {
        let events = collect(runner().run(scripts(&["echo a"]))).await;
        assert_eq!(events.len(), 2, "got {events:?}");
        assert_eq!(events[0], ExecEvent::Stdout { line: "a".into() });
        assert_eq!(final_status(&events), &ExecStatus::Success);
    }

    #[tokio::test]
    async fn missing_interpreter_is_spawn_failure_with_no_lines() {
        let events = collect(ScriptRunner::new("/no/such/interpreter").run(scripts(&["x"]))).await;
        assert_eq!(events.len(), 1, "got {events:?}");
        match final_status(&events) {
            ExecStatus::SpawnFailed { reason } => {
                assert!(reason.contains("/no/such/interpreter"), "reason: {reason}")
            }
            other => panic!("expected SpawnFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_failure_aborts_remaining_scripts() {
        let events = collect(runner().run(scripts(&["exit 1", "echo ok"]))).await;
        assert!(lines(&events).is_empty(), "second script ran: {events:?}");
        let status = final_status(&events);
        assert_eq!(
            status,
            &ExecStatus::Aborted {
                after_action: 1,
                exit_code: 1
            }
        );
        assert_eq!(status.to_string(), "aborted after action 1");
    }

    #[tokio::test]
    async fn failure_of_last_script_reports_exit_code() {
        let events = collect(runner().run(scripts(&["echo ok", "exit 3"]))).await;
        assert_eq!(lines(&events), vec!["ok"]);
        let status = final_status(&events);
        assert_eq!(status, &ExecStatus::Failed { exit_code: 3 });
        assert_eq!(status.to_string(), "exit code 3");
        assert_eq!(status.exit_code(), 3);
    }

    #[tokio::test]
    async fn scripts_run_sequentially_in_order() {
        let events = collect(runner().run(scripts(&[
            "sleep 0.2; echo one",
            "echo two",
            "echo three",
        ])))
        .await;
        assert_eq!(lines(&events), vec!["one", "two", "three"]);
        assert!(final_status(&events).is_success());
    }

    #[tokio::test]
    async fn empty_sequence_succeeds_immediately() {
        let events = collect(runner().run(Vec::new())).await;
        assert_eq!(events.len(), 1);
        assert!(final_status(&events).is_success());
    }

    #[tokio::test]
    async fn stderr_is_captured() {
        let events = collect(runner().run(scripts(&["echo err-output >&2"]))).await;
        assert_eq!(
            events[0],
            ExecEvent::Stderr {
                line: "err-output".into()
            }
        );
        assert!(final_status(&events).is_success());
    }

    #[tokio::test]
    async fn completion_waits_for_both_streams() {
        // stdout closes immediately; stderr keeps producing afterwards.
        let events = collect(runner().run(scripts(&[
            "echo first; exec 1>&-; sleep 0.3; echo late >&2",
        ])))
        .await;
        assert_eq!(events.len(), 3, "got {events:?}");
        assert_eq!(
            events[1],
            ExecEvent::Stderr {
                line: "late".into()
            }
        );
        assert!(final_status(&events).is_success());

        // And the mirror case: stderr closes first.
        let events = collect(runner().run(scripts(&[
            "echo first >&2; exec 2>&-; sleep 0.3; echo late",
        ])))
        .await;
        assert_eq!(events.len(), 3, "got {events:?}");
        assert_eq!(
            events[1],
            ExecEvent::Stdout {
                line: "late".into()
            }
        );
    }

    #[tokio::test]
    async fn interleaved_output_loses_no_lines() {
        let events = collect(runner().run(scripts(&[
            "i=1; while [ $i -le 300 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done",
        ])))
        .await;

        let out: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecEvent::Stdout { line } => Some(line.as_str()),
                _ => None,
            })
            .collect();
        let err: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ExecEvent::Stderr { line } => Some(line.as_str()),
                _ => None,
            })
            .collect();

        let expected_out: Vec<String> = (1..=300).map(|i| format!("out{i}")).collect();
        let expected_err: Vec<String> = (1..=300).map(|i| format!("err{i}")).collect();
        assert_eq!(out, expected_out);
        assert_eq!(err, expected_err);
        assert!(final_status(&events).is_success());
    }

    #[tokio::test]
    async fn last_line_without_newline_and_crlf() {
        let events = collect(runner().run(scripts(&["printf 'a\\r\\nb'"]))).await;
        assert_eq!(lines(&events), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let events = collect(runner().run(scripts(&["printf 'x\\377y\\n'"]))).await;
        assert_eq!(lines(&events), vec!["x\u{FFFD}y"]);
        assert!(final_status(&events).is_success());
    }

    /// Wait until the runtime is back to `base` live tasks, or give up.
    async fn settle_tasks(base: usize) -> usize {
        let metrics = tokio::runtime::Handle::current().metrics();
        for _ in 0..100 {
            if metrics.num_alive_tasks() <= base {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        metrics.num_alive_tasks()
    }

    #[tokio::test]
    async fn dropped_stream_ends_busy_session() {
        let base = tokio::runtime::Handle::current().metrics().num_alive_tasks();

        // An endless producer: once the receiver is gone the readers exit,
        // the pipe closes and the script dies of SIGPIPE.
        let mut stream = runner().run(scripts(&["yes"]));
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert_eq!(first, Some(ExecEvent::Stdout { line: "y".into() }));
        drop(stream);

        assert_eq!(settle_tasks(base).await, base, "session tasks still alive");
    }

    #[tokio::test]
    async fn dropped_stream_ends_silent_session() {
        let base = tokio::runtime::Handle::current().metrics().num_alive_tasks();

        let mut stream = runner().run(scripts(&["echo hi; sleep 30", "echo never"]));
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert_eq!(first, Some(ExecEvent::Stdout { line: "hi".into() }));
        drop(stream);

        // Well before the script would finish on its own.
        assert_eq!(settle_tasks(base).await, base, "readers blocked after disconnect");
    }

    #[tokio::test]
    async fn silent_reader_notices_disconnect() {
        let (tx, rx) = mpsc::channel(4);
        // The write half stays open, so the reader never sees end-of-stream.
        let (_writer, reader) = tokio::io::duplex(64);
        let task = tokio::spawn(forward_lines(reader, tx, |line| ExecEvent::Stdout { line }));
        drop(rx);
        let end = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader stayed blocked")
            .unwrap();
        assert_eq!(end, ReaderEnd::Disconnected);
    }

    /// Yields one line, then fails every later read.
    struct BrokenPipe {
        sent: bool,
    }

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::other("pipe broke")));
            }
            self.sent = true;
            buf.put_slice(b"delivered\n");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn read_error_keeps_delivered_lines() {
        let (tx, mut rx) = mpsc::channel(4);
        let end = forward_lines(BrokenPipe { sent: false }, tx, |line| ExecEvent::Stderr {
            line,
        })
        .await;
        assert_eq!(end, ReaderEnd::Failed("pipe broke".into()));
        assert_eq!(
            rx.recv().await,
            Some(ExecEvent::Stderr {
                line: "delivered".into()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn read_error_fails_the_session() {
        let outcome = settle_readers([ReaderEnd::Eof, ReaderEnd::Failed("pipe broke".into())]);
        assert_eq!(outcome, Some(Outcome::StreamFailed("pipe broke".into())));

        let step = next_step(Outcome::StreamFailed("pipe broke".into()), 1, 3);
        let Step::Stop(status) = step else {
            panic!("stream failure must end the session, got {step:?}");
        };
        assert_eq!(
            status,
            ExecStatus::StreamFailed {
                reason: "pipe broke".into()
            }
        );
        assert!(!status.is_success());
        assert_eq!(status.to_string(), "stream failed: pipe broke");
    }

    #[test]
    fn disconnect_outranks_read_error() {
        let outcome = settle_readers([ReaderEnd::Failed("x".into()), ReaderEnd::Disconnected]);
        assert_eq!(outcome, Some(Outcome::Disconnected));
        assert_eq!(settle_readers([ReaderEnd::Eof, ReaderEnd::Eof]), None);
        assert_eq!(next_step(Outcome::Disconnected, 1, 1), Step::Abandon);
    }

    #[tokio::test]
    async fn long_lines_are_split() {
        let mut data = vec![b'a'; MAX_LINE_BYTES + 10];
        data.extend_from_slice(b"\nnext\n");
        let (tx, mut rx) = mpsc::channel(8);
        let end = forward_lines(&data[..], tx, |line| ExecEvent::Stdout { line }).await;
        assert_eq!(end, ReaderEnd::Eof);

        let mut lines = Vec::new();
        while let Some(ExecEvent::Stdout { line }) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "a".repeat(10));
        assert_eq!(lines[2], "next");
    }

    #[tokio::test]
    async fn cwd_is_applied() {
        let dir = tempfile::TempDir::new().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let events = collect(runner().with_cwd(&expected).run(scripts(&["pwd -P"]))).await;
        assert_eq!(lines(&events), vec![expected.to_str().unwrap()]);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(ExecStatus::Aborted {
            after_action: 2,
            exit_code: 4,
        })
        .unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["after_action"], 2);
        assert_eq!(json["exit_code"], 4);
    }

    #[test]
    fn spawn_failure_maps_to_127() {
        let s = ExecStatus::SpawnFailed {
            reason: "nope".into(),
        };
        assert_eq!(s.exit_code(), 127);
        assert_eq!(s.to_string(), "spawn failed: nope");
    }
}
