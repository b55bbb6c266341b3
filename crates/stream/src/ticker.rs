//! Fixed-period callback driving the flush side, the render-loop half of
//! the pipeline. One task per ticker; ticks never overlap themselves.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Return value of a tick callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

pub struct Ticker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Invoke `tick` every `interval` until it returns [`TickControl::Stop`]
    /// or the ticker is cancelled. The first invocation fires immediately.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if tick() == TickControl::Stop {
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            stop: stop_tx,
            handle,
        }
    }

    /// Cancel the repeat schedule. Idempotent and immediate.
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
