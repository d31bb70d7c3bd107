//! Fixed-interval polling.
//!
//! Screens outside a live match (lobbies, friend lists) refresh by polling.
//! [`PollTask`] owns that timer as a tokio task so it can be stopped
//! deterministically instead of leaking when its owner goes away.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default timeout for [`PollTask::stop`].
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// A running poll loop.
///
/// Each tick awaits the poll future and forwards its output. The first tick
/// fires immediately. Dropping the task aborts it.
pub struct PollTask {
    task: Option<tokio::task::JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl PollTask {
    /// Spawn a loop that calls `poll` every `interval`.
    ///
    /// Returns the handle and a receiver for the outputs. The loop ends on
    /// [`stop`](Self::stop), on drop, or once the receiver is dropped.
    #[must_use = "dropping the PollTask stops polling"]
    pub fn start<F, Fut, T>(interval: Duration, mut poll: F) -> (Self, mpsc::Receiver<T>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send,
        T: Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(1);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("poll task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let output = poll().await;
                        if out_tx.send(output).await.is_err() {
                            debug!("poll receiver dropped, ending poll task");
                            break;
                        }
                    }
                }
            }
        });

        let handle = Self {
            task: Some(task),
            stop_tx: Some(stop_tx),
        };
        (handle, out_rx)
    }

    /// Stop polling and wait for the loop to exit.
    ///
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("poll task did not stop within timeout; aborting");
                task.abort();
            }
        }
    }

    /// Returns `true` until the loop has exited.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl std::fmt::Debug for PollTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollTask")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn polls_on_every_interval() {
        let (mut task, mut rx) = PollTask::start(Duration::from_secs(5), {
            let mut n = 0;
            move || {
                n += 1;
                let value = n;
                async move { value }
            }
        });
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut task, mut rx) = PollTask::start(Duration::from_secs(1), {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {}
            }
        });
        rx.recv().await.unwrap();
        task.stop().await;
        assert!(!task.is_running());
        assert!(rx.recv().await.is_none());

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_receiver_ends_the_loop() {
        let (task, rx) = PollTask::start(Duration::from_millis(10), || async { 0u8 });
        drop(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_running());
    }
}
