//! Expiration Sweep Policy
//!
//! Reads treat expired rows as absent, so sweeping is only about table size.
//! A small fraction of primary writes delete every expired row.

use rand::Rng;

/// Fraction of `put` calls that trigger a sweep
pub const DEFAULT_GC_PROBABILITY: f64 = 0.01;

// == GC Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcPolicy {
    probability: f64,
}

impl GcPolicy {
    /// Creates a policy sweeping on `probability` of writes, clamped to [0, 1].
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    /// Never sweeps from the write path.
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Rolls the dice for one write.
    pub fn should_sweep(&self) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_GC_PROBABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_sweeps() {
        let policy = GcPolicy::disabled();
        assert!((0..1000).all(|_| !policy.should_sweep()));
    }

    #[test]
    fn test_certain_always_sweeps() {
        let policy = GcPolicy::new(1.0);
        assert!((0..1000).all(|_| policy.should_sweep()));
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(GcPolicy::new(7.0).probability(), 1.0);
        assert_eq!(GcPolicy::new(-1.0).probability(), 0.0);
        assert_eq!(GcPolicy::new(f64::NAN).probability(), 0.0);
    }

    #[test]
    fn test_default_is_one_percent() {
        assert_eq!(GcPolicy::default().probability(), DEFAULT_GC_PROBABILITY);
    }
}
