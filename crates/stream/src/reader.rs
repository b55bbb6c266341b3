//! Background reader: drains a job's line sequence into the shared buffer,
//! feeding each line to an optional structured consumer on the way.
//!
//! The stop flag is checked at every line boundary, so cancelling is
//! bounded by one line's latency rather than the process lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::buffer::LineBuffer;
use crate::job::JobLines;

/// How a reader run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Per-line hook for structured consumers (the tree builder feeds its
/// model here). Raw views use [`NullConsumer`].
pub trait LineConsumer: Send {
    fn on_line(&mut self, line: &str);
}

pub struct NullConsumer;

impl LineConsumer for NullConsumer {
    fn on_line(&mut self, _line: &str) {}
}

pub struct ReaderHandle {
    handle: JoinHandle<StreamOutcome>,
    stop: watch::Sender<bool>,
}

impl ReaderHandle {
    /// Request cooperative termination. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the reader to exit, up to `timeout`. Best-effort: a reader
    /// stuck in process I/O past the deadline is left to finish on its own.
    pub async fn join(self, timeout: Duration) -> Option<StreamOutcome> {
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(join_error)) => {
                error!(%join_error, "reader task panicked");
                None
            }
            Err(_elapsed) => {
                debug!("reader did not stop within the teardown deadline");
                None
            }
        }
    }
}

/// Spawn the reader task. `on_complete` fires exactly once, and only when
/// the stream is exhausted naturally; failures and cancellations skip it
/// (the buffer's flags carry the failure).
pub fn spawn_reader<C, F>(
    mut lines: JobLines,
    buffer: Arc<LineBuffer>,
    mut consumer: C,
    on_complete: F,
) -> ReaderHandle
where
    C: LineConsumer + 'static,
    F: FnOnce() + Send + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let outcome = loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        buffer.mark_finished();
                        break StreamOutcome::Cancelled;
                    }
                }
                next = lines.next_line() => match next {
                    Ok(Some(line)) => {
                        buffer.push(line.clone());
                        consumer.on_line(&line);
                    }
                    Ok(None) => {
                        buffer.mark_finished();
                        break StreamOutcome::Completed;
                    }
                    Err(read_error) => {
                        error!(%read_error, "stream read failed");
                        buffer.mark_failed(&read_error.to_string());
                        break StreamOutcome::Failed;
                    }
                }
            }
        };
        if outcome == StreamOutcome::Completed {
            on_complete();
        }
        outcome
    });
    ReaderHandle {
        handle,
        stop: stop_tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::StreamJob;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sh(script: &str) -> (StreamJob, JobLines) {
        StreamJob::start("/bin/sh", &["-c".to_string(), script.to_string()])
    }

    struct Counting(Arc<AtomicUsize>);

    impl LineConsumer for Counting {
        fn on_line(&mut self, _line: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn drains_stream_and_fires_completion_once() {
        let (_job, lines) = sh("printf 'a\\nb\\nc\\n'");
        let buffer = Arc::new(LineBuffer::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));

        let completions_hook = Arc::clone(&completions);
        let handle = spawn_reader(lines, Arc::clone(&buffer), Counting(Arc::clone(&seen)), move || {
            completions_hook.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = handle.join(Duration::from_secs(5)).await;
        assert_eq!(outcome, Some(StreamOutcome::Completed));
        assert!(buffer.is_finished());
        assert!(!buffer.is_failed());
        assert_eq!(buffer.contents(), vec!["a", "b", "c"]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawn_failure_marks_buffer_failed_without_completion() {
        let (job, lines) = StreamJob::start("definitely-not-a-real-binary-1b2c3", &[]);
        assert!(job.failed());
        let buffer = Arc::new(LineBuffer::new());
        let completions = Arc::new(AtomicUsize::new(0));

        let completions_hook = Arc::clone(&completions);
        let handle = spawn_reader(lines, Arc::clone(&buffer), NullConsumer, move || {
            completions_hook.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = handle.join(Duration::from_secs(5)).await;
        assert_eq!(outcome, Some(StreamOutcome::Failed));
        assert!(buffer.is_finished());
        assert!(buffer.is_failed());
        assert!(buffer.is_empty());
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_cancels_within_one_line() {
        let (job, lines) = sh("while true; do echo tick; sleep 0.02; done");
        let buffer = Arc::new(LineBuffer::new());
        let handle = spawn_reader(lines, Arc::clone(&buffer), NullConsumer, || {});

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();
        let outcome = handle.join(Duration::from_secs(5)).await;
        assert_eq!(outcome, Some(StreamOutcome::Cancelled));
        assert!(buffer.is_finished());
        assert!(!buffer.is_failed());

        // Nothing more is appended once the reader has stopped.
        let frozen = buffer.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(buffer.len(), frozen);
        job.kill().await;
    }
}
