mod replay;
mod transition;

pub use replay::{DimensionMismatch, ReplayMemory, SampleError};
pub use transition::{Transition, TransitionBatch};
