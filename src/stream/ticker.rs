//! Injectable ping ticker.
//!
//! The ping cadence is the only wall-clock dependency inside a session,
//! so it sits behind a trait: the default implementation wraps a tokio
//! interval, tests drive ticks by hand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Interval between transport pings on a healthy session.
pub const PING_INTERVAL: Duration = Duration::from_secs(10);

/// A source of ping ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick.
    async fn tick(&mut self);
}

/// Factory producing one [`Ticker`] per session.
pub type TickerFactory = Arc<dyn Fn() -> Box<dyn Ticker> + Send + Sync>;

/// Wall-clock ticker firing every `period`.
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    /// A ticker whose first tick fires one full `period` from now.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// The default [`TickerFactory`]: an interval ticker at [`PING_INTERVAL`].
pub(crate) fn interval_ticker_factory() -> TickerFactory {
    Arc::new(|| Box::new(IntervalTicker::new(PING_INTERVAL)))
}
