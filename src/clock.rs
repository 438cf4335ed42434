//! Frame clocks driving transitions.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Source of animation frames. Each tick returns the time elapsed since the
/// previous one.
#[async_trait]
pub trait FrameClock: Send {
    /// Restart timing at the beginning of a transition.
    fn reset(&mut self);

    async fn tick(&mut self) -> Duration;
}

/// Wall-clock frames at a fixed rate.
pub struct IntervalClock {
    interval: Interval,
    last: Instant,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            last: Instant::now(),
        }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    fn reset(&mut self) {
        self.interval.reset();
        self.last = Instant::now();
    }

    async fn tick(&mut self) -> Duration {
        let now = self.interval.tick().await;
        let dt = now.saturating_duration_since(self.last);
        self.last = now;
        dt
    }
}

/// Deterministic frames for tests and headless runs: every tick advances by
/// the same step without waiting.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepClock {
    step: Duration,
}

impl FixedStepClock {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

#[async_trait]
impl FrameClock for FixedStepClock {
    fn reset(&mut self) {}

    async fn tick(&mut self) -> Duration {
        tokio::task::yield_now().await;
        self.step
    }
}
