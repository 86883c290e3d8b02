// src/rabbitmq/backoff.rs

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Exponential backoff for one reconnect episode.
///
/// Each delay is the current interval randomized by `randomization_factor` in both
/// directions; the interval then grows by `multiplier` up to `max_interval`. Once the time
/// elapsed since [`ExponentialBackoff::reset`] plus the next delay would exceed
/// `max_elapsed_time`, [`ExponentialBackoff::next_backoff`] returns `None`. With no
/// `max_elapsed_time` it never gives up.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
    current_interval: Duration,
    start: Instant,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ExponentialBackoff {
    /// A zero budget is treated as unbounded.
    pub fn new(max_elapsed_time: Option<Duration>) -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed_time: max_elapsed_time.filter(|d| !d.is_zero()),
            current_interval: DEFAULT_INITIAL_INTERVAL,
            start: Instant::now(),
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self.current_interval = interval;
        self
    }

    /// Values below 1 (and NaN) are raised to 1, which keeps the interval constant.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier >= 1.0 && multiplier.is_finite() {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }

    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        let next = self.randomized(self.current_interval);
        self.grow();

        match self.max_elapsed_time {
            Some(max) if elapsed + next > max => None,
            _ => Some(next),
        }
    }

    fn randomized(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let delta = self.randomization_factor * interval.as_secs_f64();
        let low = interval.as_secs_f64() - delta;
        let high = interval.as_secs_f64() + delta;
        Duration::from_secs_f64(low + rand::random::<f64>() * (high - low))
    }

    fn grow(&mut self) {
        if self.current_interval >= self.max_interval {
            self.current_interval = self.max_interval;
            return;
        }
        let grown = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        };
    }
}
