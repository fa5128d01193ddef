//! Debounced flush timer.
//!
//! Every mutation resets a single timer; when it expires the store flushes
//! its dirty shards in one batch. A review session answers cards in bursts,
//! and without coalescing every answer would hit the disk — wasteful, and on
//! file-sync-backed storage it multiplies sync churn and conflict windows.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Messages controlling the flush timer task
#[derive(Debug)]
enum TimerMessage {
    /// A mutation happened — (re)start the debounce window
    Arm,
    /// Drop any pending window without firing
    Cancel,
    /// Store is shutting down
    Shutdown,
}

/// Handle for the debounce timer task.
///
/// Dropping the handle shuts the task down.
pub(crate) struct FlushTimer {
    sender: mpsc::Sender<TimerMessage>,
}

impl FlushTimer {
    /// Reset the debounce window; the pending deadline, if any, is superseded
    pub fn arm(&self) {
        let _ = self.sender.try_send(TimerMessage::Arm);
    }

    /// Cancel any pending window (used by save_now before an explicit flush)
    pub fn cancel(&self) {
        let _ = self.sender.try_send(TimerMessage::Cancel);
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        let _ = self.sender.try_send(TimerMessage::Shutdown);
    }
}

/// Spawn the debounce timer task.
///
/// `on_fire` runs each time a window expires; it returns `false` when the
/// store is gone and the task should stop.
pub(crate) fn spawn_flush_timer<F, Fut>(debounce: Duration, mut on_fire: F) -> FlushTimer
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
{
    let (tx, mut rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TimerMessage::Arm) => {
                        deadline = Some(Instant::now() + debounce);
                    }
                    Some(TimerMessage::Cancel) => {
                        deadline = None;
                    }
                    Some(TimerMessage::Shutdown) | None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    deadline = None;
                    if !on_fire().await {
                        break;
                    }
                }
            }
        }
    });

    FlushTimer { sender: tx }
}
