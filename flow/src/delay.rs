//! Strategies producing the simulated latency of pipeline stages.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use flow_config::shared::DelayRangeConfig;
use rand::Rng;

/// Source of per-item delays.
///
/// Implementations are shared by several tasks, so they must be thread safe.
pub trait DelayStrategy: fmt::Debug + Send + Sync {
    /// Returns the delay to apply before the next item.
    fn next_delay(&self) -> Duration;
}

/// Shared, type-erased [`DelayStrategy`].
pub type SharedDelay = Arc<dyn DelayStrategy>;

/// Draws delays uniformly from an inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct UniformDelay {
    min: Duration,
    max: Duration,
}

impl UniformDelay {
    /// Creates a uniform delay. The bounds are swapped when `min > max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl DelayStrategy for UniformDelay {
    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }

        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Always returns the same delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    /// A delay of zero, for deterministic runs.
    pub const ZERO: FixedDelay = FixedDelay(Duration::ZERO);
}

impl DelayStrategy for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// Builds the strategy described by a configured range.
///
/// A degenerate range yields a [`FixedDelay`], anything else a [`UniformDelay`].
pub fn delay_from_config(config: &DelayRangeConfig) -> SharedDelay {
    if config.min_ms == config.max_ms {
        Arc::new(FixedDelay(config.min()))
    } else {
        Arc::new(UniformDelay::new(config.min(), config.max()))
    }
}

/// Sleeps for the next delay of `strategy`, skipping the timer entirely for zero delays.
pub(crate) async fn sleep_next(strategy: &dyn DelayStrategy) {
    let delay = strategy.next_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_delay_stays_within_bounds() {
        let strategy = UniformDelay::new(Duration::from_millis(100), Duration::from_millis(1000));
        for _ in 0..1000 {
            let delay = strategy.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn uniform_delay_accepts_inverted_bounds() {
        let strategy = UniformDelay::new(Duration::from_millis(20), Duration::from_millis(10));
        let delay = strategy.next_delay();
        assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
    }

    #[test]
    fn degenerate_config_yields_fixed_delay() {
        let strategy = delay_from_config(&DelayRangeConfig::new(7, 7));
        assert_eq!(strategy.next_delay(), Duration::from_millis(7));

        let strategy = delay_from_config(&DelayRangeConfig::ZERO);
        assert_eq!(strategy.next_delay(), Duration::ZERO);
    }
}
