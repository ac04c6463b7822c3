//! Probabilistic verification of remote results.
//!
//! With probability `p` a successful remote call is re-executed in-process
//! and the two outputs must be equal. Sampling sits behind [`Sampler`] so
//! tests can force either branch.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde_json::Value;

use crate::error::{DispatchError, Result};

/// Source of verification decisions.
pub trait Sampler: Send + Sync {
    /// True with probability `probability`, which lies in `[0, 1]`.
    fn sample(&self, probability: f64) -> bool;
}

/// Draws from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn sample(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            false
        } else if probability >= 1.0 {
            true
        } else {
            rand::thread_rng().gen_bool(probability)
        }
    }
}

/// Always answers the same way, regardless of probability.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub bool);

impl Sampler for FixedSampler {
    fn sample(&self, _probability: f64) -> bool {
        self.0
    }
}

#[derive(Clone)]
pub struct Verifier {
    probability: f64,
    sampler: Arc<dyn Sampler>,
}

impl Verifier {
    pub fn new(probability: f64) -> Self {
        Self::with_sampler(probability, RandomSampler)
    }

    pub fn with_sampler(probability: f64, sampler: impl Sampler + 'static) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            probability,
            sampler: Arc::new(sampler),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Decide whether this call gets cross-checked.
    pub fn should_verify(&self) -> bool {
        self.sampler.sample(self.probability)
    }

    /// Compare a remote output with the local re-execution.
    pub fn check(&self, remote: &Value, local: &Value) -> Result<()> {
        if remote == local {
            Ok(())
        } else {
            Err(DispatchError::Verification {
                remote: remote.clone(),
                local: local.clone(),
            })
        }
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("probability", &self.probability)
            .finish_non_exhaustive()
    }
}
