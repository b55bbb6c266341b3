//! One external command invocation exposed as a forward-only line sequence.

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handle on a spawned external command. The line sequence is handed out
/// separately (see [`StreamJob::start`]) so the reader task can own it
/// while the view keeps the kill handle.
#[derive(Clone)]
pub struct StreamJob {
    child: Arc<Mutex<Option<Child>>>,
    failed: bool,
    command: String,
}

/// The job's stdout as a lazy, finite sequence of text lines.
pub struct JobLines {
    inner: Option<Lines<BufReader<ChildStdout>>>,
}

impl JobLines {
    /// Next line, `Ok(None)` at end of stream. A job that never spawned
    /// yields an error so callers can tell "failed" from "empty".
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        match &mut self.inner {
            Some(lines) => lines.next_line().await,
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "process was never spawned",
            )),
        }
    }
}

impl StreamJob {
    /// Spawn `program args...` with stdout piped. A spawn failure is not an
    /// error here: it produces a job with `failed()` set whose sequence
    /// reports the failure on first read.
    pub fn start(program: &str, args: &[String]) -> (Self, JobLines) {
        let command_line = render_command(program, args);
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match command.spawn() {
            Ok(mut child) => {
                let stdout = child.stdout.take();
                let job = Self {
                    child: Arc::new(Mutex::new(Some(child))),
                    failed: stdout.is_none(),
                    command: command_line,
                };
                let lines = JobLines {
                    inner: stdout.map(|out| BufReader::new(out).lines()),
                };
                (job, lines)
            }
            Err(error) => {
                warn!(command = %command_line, %error, "spawn failed");
                let job = Self {
                    child: Arc::new(Mutex::new(None)),
                    failed: true,
                    command: command_line,
                };
                (job, JobLines { inner: None })
            }
        }
    }

    /// Whether the command could not be started.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Terminate the process and reap it, unblocking any pending read.
    /// Idempotent; safe after natural completion.
    pub async fn kill(&self) {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Err(error) = child.kill().await {
                debug!(command = %self.command, %error, "kill on exited process");
            }
            *guard = None;
        }
    }
}

fn render_command(program: &str, args: &[String]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}
