use std::fmt;

use crate::params::ShapeMismatch;

/// Invalid hyperparameters, detected when a component is constructed
///
/// A `ConfigError` is never recoverable: the component (and any agent built on it) is not created.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count (epoch length, capacity, interval, ...) must be at least `min`
    InvalidCount {
        field: &'static str,
        value: usize,
        min: usize,
    },
    /// A numeric hyperparameter lies outside its interval
    ///
    /// The upper bound is inclusive; the lower bound is excluded when `min_open` is set.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
        min_open: bool,
    },
    /// A network whose input or output width does not fit the agent
    Dimension {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    /// Two parameter sets that must line up tensor by tensor do not
    Parameters(ShapeMismatch),
    /// A decay schedule whose direction contradicts its endpoints
    Decay(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value, min } => {
                write!(f, "`{}` must be at least {}, got {}", field, min, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
                min_open,
            } => {
                let open = if *min_open { '(' } else { '[' };
                write!(
                    f,
                    "`{}` must be in {}{}, {}], got {}",
                    field, open, min, max, value
                )
            }
            ConfigError::Dimension {
                field,
                expected,
                found,
            } => write!(f, "`{}` is {}, expected {}", field, found, expected),
            ConfigError::Parameters(mismatch) => write!(f, "incompatible parameters: {}", mismatch),
            ConfigError::Decay(msg) => write!(f, "invalid decay schedule: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parameters(mismatch) => Some(mismatch),
            _ => None,
        }
    }
}
