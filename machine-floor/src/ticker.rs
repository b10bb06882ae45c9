//! Cancellable repeating timer.
//!
//! A [`Ticker`] sends a copy of its event into a channel once per period,
//! starting one full period after it is created. Dropping the handle
//! cancels the task, so a ticker can never outlive the view that owns it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// First tick for periods too long to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug)]
pub struct Ticker {
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn start<E>(period: Duration, tx: mpsc::Sender<E>, event: E) -> Self
    where
        E: Clone + Send + 'static,
    {
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        let now = Instant::now();
        let first = now.checked_add(period).unwrap_or(now + FAR_FUTURE);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(event.clone()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancellation,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation.is_cancelled() && !self.handle.is_finished()
    }

    /// Stop ticking. Equivalent to dropping the handle.
    pub fn stop(self) {}
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
