mod buffer;
mod epoch;
pub mod gae;

pub use buffer::{Batch, BufferError, TrajectoryBuffer};
pub use epoch::{EpochConfig, EpochController, Observed, Phase};
