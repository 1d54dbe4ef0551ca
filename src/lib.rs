/// The agent interface and the episode loop
pub mod agent;

/// Implemented RL algorithms
pub mod algo;

/// Function approximators and burn integration
pub mod approx;

/// Implementations of strategies for time-decaying hyperparameters
pub mod decay;

/// Data structures
pub mod ds;

/// Environment
pub mod env;

/// Configuration errors
pub mod error;

/// Exploration policies
pub mod exploration;

/// Experience replay
pub mod memory;

/// Serializable parameter snapshots
pub mod params;

/// On-policy trajectory collection and GAE-λ
pub mod rollout;

/// Target network synchronization
pub mod target;

/// Testing environments
#[cfg(feature = "gym")]
pub mod gym;

mod util;
