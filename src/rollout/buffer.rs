use std::fmt;

use log::{trace, warn};

use super::gae::{self, STD_EPSILON};
use crate::{
    error::ConfigError,
    util::{check_count, check_interval},
};

/// Misuse of a [`TrajectoryBuffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// `store` was called with every slot already written
    BufferFull { capacity: usize },
    /// `get` was called before every slot was written
    BufferNotFull { len: usize, capacity: usize },
    /// `get` was called while the last path was still open
    PathOpen { path_start: usize, len: usize },
    /// An observation or action had the wrong length
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::BufferFull { capacity } => {
                write!(f, "trajectory buffer is full ({} steps)", capacity)
            }
            BufferError::BufferNotFull { len, capacity } => {
                write!(f, "trajectory buffer holds {} of {} steps", len, capacity)
            }
            BufferError::PathOpen { path_start, len } => write!(
                f,
                "path starting at step {} of {} has not been finished",
                path_start, len
            ),
            BufferError::DimensionMismatch {
                field,
                expected,
                found,
            } => write!(f, "{} has length {}, expected {}", field, found, expected),
        }
    }
}

impl std::error::Error for BufferError {}

/// A full epoch of data handed out by [`TrajectoryBuffer::get`]
///
/// `observations` and `actions` are row-major with `obs_dim` and `act_dim` columns.
/// Only `advantages` are normalized.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub observations: &'a [f64],
    pub actions: &'a [f64],
    pub advantages: &'a [f64],
    pub returns: &'a [f64],
    pub obs_dim: usize,
    pub act_dim: usize,
}

impl Batch<'_> {
    /// Number of steps in the batch
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// A fixed-size, single-writer store of on-policy rollout steps
///
/// Steps are appended with [`store`](TrajectoryBuffer::store). Whenever an episode ends (or is cut
/// off) the open path is closed with [`finish_path`](TrajectoryBuffer::finish_path), which fills in
/// GAE-λ advantages and rewards-to-go for that path. Once every slot is written,
/// [`get`](TrajectoryBuffer::get) hands out the epoch and rewinds the buffer; the backing storage is
/// reused by the next epoch.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    observations: Vec<f64>,
    actions: Vec<f64>,
    rewards: Vec<f64>,
    values: Vec<f64>,
    advantages: Vec<f64>,
    returns: Vec<f64>,
    obs_dim: usize,
    act_dim: usize,
    capacity: usize,
    write_pos: usize,
    path_start: usize,
    gamma: f64,
    lambda: f64,
}

impl TrajectoryBuffer {
    /// Allocate a buffer for `capacity` steps
    ///
    /// ### Arguments
    /// - `capacity` - Steps per epoch, must be positive
    /// - `obs_dim`, `act_dim` - Observation and action lengths, must be positive
    /// - `gamma` - The discount factor, in `[0,1]`
    /// - `lambda` - The GAE trace decay, in `[0,1]`
    pub fn new(
        capacity: usize,
        obs_dim: usize,
        act_dim: usize,
        gamma: f64,
        lambda: f64,
    ) -> Result<Self, ConfigError> {
        check_count("capacity", capacity, 1)?;
        check_count("obs_dim", obs_dim, 1)?;
        check_count("act_dim", act_dim, 1)?;
        check_interval("gamma", gamma, 0.0, 1.0)?;
        check_interval("lambda", lambda, 0.0, 1.0)?;

        Ok(Self {
            observations: vec![0.0; capacity * obs_dim],
            actions: vec![0.0; capacity * act_dim],
            rewards: vec![0.0; capacity],
            values: vec![0.0; capacity],
            advantages: vec![0.0; capacity],
            returns: vec![0.0; capacity],
            obs_dim,
            act_dim,
            capacity,
            write_pos: 0,
            path_start: 0,
            gamma,
            lambda,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of steps written this epoch
    pub fn len(&self) -> usize {
        self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    pub fn is_full(&self) -> bool {
        self.write_pos == self.capacity
    }

    /// Index at which the currently open path began
    pub fn path_start(&self) -> usize {
        self.path_start
    }

    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Append one step to the open path
    ///
    /// On error nothing is written.
    pub fn store(
        &mut self,
        observation: &[f64],
        action: &[f64],
        reward: f64,
        value: f64,
    ) -> Result<(), BufferError> {
        if self.is_full() {
            return Err(BufferError::BufferFull {
                capacity: self.capacity,
            });
        }
        if observation.len() != self.obs_dim {
            return Err(BufferError::DimensionMismatch {
                field: "observation",
                expected: self.obs_dim,
                found: observation.len(),
            });
        }
        if action.len() != self.act_dim {
            return Err(BufferError::DimensionMismatch {
                field: "action",
                expected: self.act_dim,
                found: action.len(),
            });
        }

        let ix = self.write_pos;
        self.observations[ix * self.obs_dim..(ix + 1) * self.obs_dim].copy_from_slice(observation);
        self.actions[ix * self.act_dim..(ix + 1) * self.act_dim].copy_from_slice(action);
        self.rewards[ix] = reward;
        self.values[ix] = value;
        self.write_pos += 1;

        trace!("stored step {} (reward {}, value {})", ix, reward, value);
        Ok(())
    }

    /// Close the open path `[path_start, len)`, computing its advantages and rewards-to-go
    ///
    /// `bootstrap_value` stands in for the value of the state following the path: `0.0` when the
    /// path ended in a terminal state, otherwise the estimated value of the cut-off observation.
    /// Closing an empty path does nothing.
    pub fn finish_path(&mut self, bootstrap_value: f64) {
        let path = self.path_start..self.write_pos;
        if path.is_empty() {
            return;
        }
        let (gamma, lambda) = (self.gamma, self.lambda);

        let rewards = &self.rewards[path.clone()];
        let advantages = &mut self.advantages[path.clone()];
        gae::td_residuals(
            rewards,
            &self.values[path.clone()],
            bootstrap_value,
            gamma,
            advantages,
        );
        gae::discount_cumsum(advantages, gamma * lambda, 0.0);

        let returns = &mut self.returns[path];
        returns.copy_from_slice(rewards);
        gae::discount_cumsum(returns, gamma, bootstrap_value);

        self.path_start = self.write_pos;
    }

    /// Hand out the full epoch and rewind the buffer
    ///
    /// Advantages are normalized in place to zero mean and unit standard deviation; returns are left
    /// untouched.
    pub fn get(&mut self) -> Result<Batch<'_>, BufferError> {
        if !self.is_full() {
            return Err(BufferError::BufferNotFull {
                len: self.write_pos,
                capacity: self.capacity,
            });
        }
        if self.path_start != self.write_pos {
            return Err(BufferError::PathOpen {
                path_start: self.path_start,
                len: self.write_pos,
            });
        }

        let (_, std) = gae::normalize(&mut self.advantages);
        if std <= STD_EPSILON {
            warn!("advantages are constant across the epoch; normalized to zero");
        }
        self.write_pos = 0;
        self.path_start = 0;

        Ok(Batch {
            observations: &self.observations,
            actions: &self.actions,
            advantages: &self.advantages,
            returns: &self.returns,
            obs_dim: self.obs_dim,
            act_dim: self.act_dim,
        })
    }
}
