//! Stochastic delay draws.
//!
//! All randomness in the simulator flows through these two functions, always
//! from an explicit generator handle owned by the calling model. Keeping the
//! handle in model state (rather than a process-wide generator) makes every
//! draw order well-defined and the whole run replayable from a single seed.

use rand_core::RngCore;
use rand_distr::{Distribution, Exp, Uniform};

/// Draws a delay from an exponential distribution with the given rate
/// (`rate` is 1/mean, in 1/seconds).
pub fn exponential_delay<R: RngCore>(random: &mut R, rate: f64) -> f64 {
    let distribution =
        Exp::new(rate).unwrap_or_else(|_| panic!("non-positive exponential rate {}", rate));
    distribution.sample(random)
}

/// Draws a delay uniformly from `[min, max)` seconds.
pub fn uniform_delay<R: RngCore>(random: &mut R, min: f64, max: f64) -> f64 {
    Uniform::new(min, max).sample(random)
}
