// src/utils/ticker.rs
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the background task behind a repeating 1-second callback. The
/// previous task is always aborted before a new one is spawned, so two
/// tick loops can never run for the same handle.
pub struct Ticker {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    pub fn with_period(period: Duration) -> Self {
        Self { period, handle: None }
    }

    /// Cancel any running tick loop, then spawn a fresh one.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.stop();
        let period = self.period;
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick of a fresh interval completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                on_tick().await;
            }
        }));
    }

    /// Cooperative cancellation: the scheduled callback is dropped and no
    /// further ticks fire.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
