#[cfg(test)]
#[path = "polling_test.rs"]
mod tests;

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A periodic task. The first tick runs immediately, later ticks run every
/// `interval` after the previous one finished. The loop stops when `tick`
/// breaks, when `cancel` is called, or when the subscription is dropped.
pub struct PollingSubscription {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollingSubscription {
    pub fn start<F, Fut>(name: &'static str, interval: Duration, tick: F) -> PollingSubscription
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        return PollingSubscription::spawn(name, interval, time::interval(interval), tick);
    }

    /// Same as `start`, but the first tick waits one full interval.
    pub fn start_delayed<F, Fut>(
        name: &'static str,
        interval: Duration,
        tick: F,
    ) -> PollingSubscription
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let ticker = time::interval_at(Instant::now() + interval, interval);
        return PollingSubscription::spawn(name, interval, ticker, tick);
    }

    fn spawn<F, Fut>(
        name: &'static str,
        interval: Duration,
        mut ticker: Interval,
        mut tick: F,
    ) -> PollingSubscription
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // An in-flight tick is dropped on cancellation, taking any
                // pending request with it.
                let flow = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    flow = tick() => flow,
                };

                if flow.is_break() {
                    tracing::debug!(subscription = name, "Polling finished");
                    break;
                }
            }

            loop_token.cancel();
        });

        tracing::debug!(subscription = name, interval_ms = interval.as_millis() as u64, "Polling started");

        return PollingSubscription {
            name,
            token,
            handle,
        };
    }

    /// Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(subscription = self.name, "Polling cancelled");
        }

        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        return !self.token.is_cancelled() && !self.handle.is_finished();
    }
}

impl Drop for PollingSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
