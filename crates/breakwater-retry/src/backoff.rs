use rand::Rng;
use std::time::Duration;

/// Computes the delay before a retry.
pub trait IntervalFunction: Send + Sync {
    /// `retry_index` is 0 for the first retry, 1 for the second, and so on.
    fn next_interval(&self, retry_index: usize) -> Duration;
}

/// Same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _retry_index: usize) -> Duration {
        self.duration
    }
}

/// `base * multiplier^retry_index`, optionally capped and randomized.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Multiplier 2.0, no cap, no jitter.
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            multiplier: 2.0,
            max_interval: None,
            jitter: 0.0,
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Randomizes each delay uniformly within `±factor` of its computed value.
    ///
    /// The factor is clamped to `0.0..=1.0`. A factor of 0.5 yields delays
    /// between 50% and 150% of the deterministic value.
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.jitter <= 0.0 || interval.is_zero() {
            return interval;
        }
        let nanos = interval.as_nanos() as f64;
        let delta = nanos * self.jitter;
        from_nanos_saturating(rand::rng().random_range((nanos - delta)..=(nanos + delta)))
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, retry_index: usize) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let interval =
            from_nanos_saturating(self.base.as_nanos() as f64 * self.multiplier.powi(exponent));
        let capped = match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        };
        self.randomize(capped)
    }
}

// Durations past ~584 years (or non-finite products) saturate to Duration::MAX.
fn from_nanos_saturating(nanos: f64) -> Duration {
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos.round() as u64)
    }
}

/// Delay computed by a closure.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, retry_index: usize) -> Duration {
        (self.f)(retry_index)
    }
}
