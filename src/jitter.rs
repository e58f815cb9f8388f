//! Injectable randomness source for backoff jitter.
//!
//! Backoff waits add a bounded random component to avoid synchronized retry
//! storms across concurrent ingestion tasks. The randomness source is a trait
//! so tests can substitute a deterministic generator and assert exact waits.

use rand::Rng;

/// Source of bounded random jitter added to computed waits.
pub trait JitterSource: Send + Sync {
    /// Sample a value uniformly from `[0, upper)`.
    ///
    /// Implementations must return `0.0` when `upper` is zero or negative.
    fn sample(&self, upper: f64) -> f64;
}

/// Default jitter source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, upper: f64) -> f64 {
        if upper <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(0.0..upper)
    }
}

/// Jitter source that always returns zero. Intended for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self, _upper: f64) -> f64 {
        0.0
    }
}
