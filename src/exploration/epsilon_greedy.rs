use rand::Rng;

use super::Choice;
use crate::decay::Decay;

/// Epsilon greedy exploration policy with time-decaying epsilon threshold
#[derive(Debug, Clone)]
pub struct EpsilonGreedy<D: Decay> {
    epsilon: D,
}

impl<D: Decay> EpsilonGreedy<D> {
    /// Initialize epsilon greedy policy with a decay strategy
    pub fn new(decay: D) -> Self {
        Self { epsilon: decay }
    }

    /// Exploration probability at time `t`
    pub fn epsilon(&self, t: u64) -> f64 {
        self.epsilon.evaluate(t as f64)
    }

    /// Invoke epsilon greedy policy at time `t`
    pub fn choose<R: Rng + ?Sized>(&self, t: u64, rng: &mut R) -> Choice {
        if rng.gen::<f64>() >= self.epsilon(t) {
            Choice::Exploit
        } else {
            Choice::Explore
        }
    }
}
