//! Tick sources for poll loops

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Recurring tick owned by one poll loop
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

/// Creates tickers for poll loops
pub trait Scheduler: Send + Sync {
    /// A ticker whose first tick arrives one `period` from now
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// Production scheduler backed by `tokio::time::interval`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

struct IntervalTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

impl Scheduler for TokioScheduler {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let mut interval = interval_at(Instant::now() + period, period);
        // A slow status fetch pushes the next tick back instead of bursting
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(IntervalTicker { interval })
    }
}

/// Scheduler whose ticks are fired by hand, for deterministic tests.
///
/// Every ticker created from it receives each [`ManualScheduler::advance`]
/// call; ticks fired while a loop is busy are buffered, not lost.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    sender: broadcast::Sender<()>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Fire one tick on every live ticker; returns how many tickers saw it
    pub fn advance(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }

    /// Number of tickers still alive
    pub fn live_tickers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

struct ManualTicker {
    receiver: broadcast::Receiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        match self.receiver.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            // Scheduler gone: no tick will ever come
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        Box::new(ManualTicker {
            receiver: self.sender.subscribe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_ticker_skips_immediate_tick() {
        let start = Instant::now();
        let mut ticker = TokioScheduler.ticker(Duration::from_millis(3000));

        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));

        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_manual_ticks_are_buffered() {
        let scheduler = ManualScheduler::new();
        let mut a = scheduler.ticker(Duration::from_secs(3));
        let mut b = scheduler.ticker(Duration::from_secs(3));

        assert_eq!(scheduler.live_tickers(), 2);
        assert_eq!(scheduler.advance(), 2);

        a.tick().await;
        b.tick().await;

        drop(a);
        assert_eq!(scheduler.live_tickers(), 1);
    }
}
