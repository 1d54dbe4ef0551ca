use std::fmt;

use rand::{seq::SliceRandom, Rng};

use super::{Transition, TransitionBatch};
use crate::{ds::RingBuffer, error::ConfigError, util::check_count};

/// Why [`ReplayMemory::sample`] produced no batch
///
/// Both cases are routine during warm-up; agents skip the learning step rather than fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    EmptyBuffer,
    /// Fewer transitions stored than the warm-up size or the batch size
    InsufficientSamples { available: usize, required: usize },
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::EmptyBuffer => write!(f, "replay memory is empty"),
            SampleError::InsufficientSamples {
                available,
                required,
            } => write!(
                f,
                "replay memory holds {} transitions, {} required",
                available, required
            ),
        }
    }
}

impl std::error::Error for SampleError {}

/// A transition that does not fit the memory's dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub field: &'static str,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transition {} has length {}, expected {}",
            self.field, self.found, self.expected
        )
    }
}

impl std::error::Error for DimensionMismatch {}

/// A fixed-size memory storage for off-policy experience
///
/// Transitions live in a ring buffer: once it reaches capacity the oldest transition is evicted.
/// Batches are drawn uniformly without replacement, and only once `min_size` transitions are stored.
#[derive(Debug, Clone)]
pub struct ReplayMemory {
    memory: RingBuffer<Transition>,
    batch_size: usize,
    min_size: usize,
    obs_dim: usize,
    act_dim: usize,
}

impl ReplayMemory {
    /// ### Arguments
    /// - `capacity` - Maximum number of transitions kept
    /// - `batch_size` - Transitions per sampled batch, at most `capacity`
    /// - `min_size` - Warm-up size before sampling succeeds, at most `capacity`
    /// - `obs_dim`, `act_dim` - Observation and action lengths
    pub fn new(
        capacity: usize,
        batch_size: usize,
        min_size: usize,
        obs_dim: usize,
        act_dim: usize,
    ) -> Result<Self, ConfigError> {
        check_count("capacity", capacity, 1)?;
        check_count("batch_size", batch_size, 1)?;
        check_count("capacity", capacity, batch_size)?;
        check_count("capacity", capacity, min_size)?;
        check_count("obs_dim", obs_dim, 1)?;
        check_count("act_dim", act_dim, 1)?;
        Ok(Self {
            memory: RingBuffer::new(capacity),
            batch_size,
            min_size,
            obs_dim,
            act_dim,
        })
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Stored transitions in slot order, which is insertion order until the memory first wraps
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.memory.view().iter()
    }

    /// Add a new transition to the memory, evicting the oldest one if full
    pub fn add(&mut self, transition: Transition) -> Result<(), DimensionMismatch> {
        let checks = [
            ("state", self.obs_dim, transition.state.len()),
            ("next_state", self.obs_dim, transition.next_state.len()),
            ("action", self.act_dim, transition.action.len()),
        ];
        for (field, expected, found) in checks {
            if expected != found {
                return Err(DimensionMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }
        if !transition.next_action.is_empty() && transition.next_action.len() != self.act_dim {
            return Err(DimensionMismatch {
                field: "next_action",
                expected: self.act_dim,
                found: transition.next_action.len(),
            });
        }

        self.memory.push(transition);
        Ok(())
    }

    /// Sample a random batch of transitions and zip it into flat arrays
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<TransitionBatch, SampleError> {
        let available = self.memory.len();
        if available == 0 {
            return Err(SampleError::EmptyBuffer);
        }
        let required = self.batch_size.max(self.min_size);
        if available < required {
            return Err(SampleError::InsufficientSamples {
                available,
                required,
            });
        }

        let transitions = self.memory.view().choose_multiple(rng, self.batch_size);
        Ok(TransitionBatch::from_iter(
            transitions,
            self.batch_size,
            self.obs_dim,
            self.act_dim,
        ))
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::memory::transition::tests::transition;

    #[test]
    fn new_rejects_invalid_config() {
        assert!(ReplayMemory::new(0, 1, 0, 2, 1).is_err(), "capacity");
        assert!(ReplayMemory::new(4, 8, 0, 2, 1).is_err(), "batch larger than capacity");
        assert!(ReplayMemory::new(4, 2, 5, 2, 1).is_err(), "warm-up larger than capacity");
    }

    #[test]
    fn replay_memory_functional() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut memory = ReplayMemory::new(4, 2, 3, 2, 1).unwrap();

        assert_eq!(memory.sample(&mut rng), Err(SampleError::EmptyBuffer));

        memory.add(transition(0, false)).unwrap();
        memory.add(transition(1, false)).unwrap();
        assert_eq!(
            memory.sample(&mut rng),
            Err(SampleError::InsufficientSamples {
                available: 2,
                required: 3
            }),
            "warm-up not reached"
        );

        memory.add(transition(2, true)).unwrap();
        let batch = memory.sample(&mut rng).unwrap();
        assert_eq!(batch.len, 2, "batch size");
        assert_eq!(batch.states.len(), 4, "two rows of two");
    }

    #[test]
    fn evicts_oldest() {
        let mut memory = ReplayMemory::new(2, 2, 0, 2, 1).unwrap();
        for i in 0..3 {
            memory.add(transition(i, false)).unwrap();
        }
        assert_eq!(memory.len(), 2);

        let batch = memory.sample(&mut StdRng::seed_from_u64(1)).unwrap();
        assert!(
            !batch.states.chunks(2).any(|s| s[0] == 0.0),
            "first transition evicted"
        );
    }

    #[test]
    fn add_checks_dimensions() {
        let mut memory = ReplayMemory::new(2, 1, 0, 3, 1).unwrap();
        assert_eq!(
            memory.add(transition(0, false)),
            Err(DimensionMismatch {
                field: "state",
                expected: 3,
                found: 2
            })
        );
        assert!(memory.is_empty());
    }
}
