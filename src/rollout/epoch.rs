use burn::config::Config;
use log::{debug, trace};

use super::buffer::{Batch, TrajectoryBuffer};
use crate::{approx::ValueEstimator, env::TimeStep, error::ConfigError};

/// Configuration for an [`EpochController`]
#[derive(Config, Debug)]
pub struct EpochConfig {
    /// Number of recorded steps per learning step
    #[config(default = 4000)]
    pub epoch_length: usize,
    /// The discount factor
    #[config(default = 0.99)]
    pub gamma: f64,
    /// The GAE trace decay
    #[config(default = 0.97)]
    pub lambda: f64,
    /// Whether an episode still running when the epoch fills must end before the next epoch starts
    /// recording. The rest of such an episode is discarded.
    #[config(default = true)]
    pub finish_episode_on_epoch_end: bool,
}

/// Recording state of an [`EpochController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Steps are written to the trajectory buffer
    #[default]
    Collecting,
    /// The epoch filled mid-episode; steps are dropped until the episode ends
    FinishingEpisode,
}

/// What [`EpochController::observe`] did with a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observed {
    /// Written to the buffer, path still open
    Stored,
    /// Written to the buffer and closed the current path
    PathFinished {
        /// Value standing in for the continuation return (`0.0` after a terminal state)
        bootstrap: f64,
        /// Whether this step completed the epoch
        epoch_full: bool,
    },
    /// Dropped as part of the tail of an episode that straddled the epoch boundary
    Discarded,
}

/// Decides, step by step, what goes into the [`TrajectoryBuffer`] and when an epoch is ready
///
/// Drive it from a single interaction loop:
/// 1. [`observe_first`](Self::observe_first) with the first step of every episode
/// 2. [`observe`](Self::observe) after every environment step
/// 3. [`end_episode`](Self::end_episode) whenever an episode is over
/// 4. [`take_batch`](Self::take_batch) to pull a full epoch for learning
#[derive(Debug, Clone)]
pub struct EpochController {
    buffer: TrajectoryBuffer,
    epoch_length: usize,
    current_epoch_step: usize,
    completed_epochs: usize,
    phase: Phase,
    finish_episode_on_epoch_end: bool,
    prev_observation: Option<Vec<f64>>,
}

impl EpochController {
    pub fn new(config: &EpochConfig, obs_dim: usize, act_dim: usize) -> Result<Self, ConfigError> {
        let buffer = TrajectoryBuffer::new(
            config.epoch_length,
            obs_dim,
            act_dim,
            config.gamma,
            config.lambda,
        )?;
        Ok(Self {
            buffer,
            epoch_length: config.epoch_length,
            current_epoch_step: 0,
            completed_epochs: 0,
            phase: Phase::Collecting,
            finish_episode_on_epoch_end: config.finish_episode_on_epoch_end,
            prev_observation: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch_length(&self) -> usize {
        self.epoch_length
    }

    /// Steps recorded (not merely observed) in the current epoch
    pub fn current_epoch_step(&self) -> usize {
        self.current_epoch_step
    }

    pub fn completed_epochs(&self) -> usize {
        self.completed_epochs
    }

    pub fn buffer(&self) -> &TrajectoryBuffer {
        &self.buffer
    }

    /// Whether a full epoch is waiting for [`take_batch`](Self::take_batch)
    ///
    /// An epoch that filled mid-episode only becomes ready once that episode has ended.
    pub fn is_ready(&self) -> bool {
        self.is_full() && self.phase == Phase::Collecting
    }

    fn is_full(&self) -> bool {
        self.current_epoch_step == self.epoch_length
    }

    /// Record the first step of an episode
    pub fn observe_first(&mut self, step: &TimeStep) {
        self.prev_observation = Some(step.observation.clone());
    }

    /// Record the outcome of taking `action` in the previous step's observation
    ///
    /// `critic` supplies the value of the previous observation and, when a path is cut off, the
    /// value of `next_step`'s observation.
    ///
    /// **Panics** if no previous step was observed, or if a step arrives while a full epoch is still
    /// waiting to be taken. Both are driving-loop bugs.
    pub fn observe<V>(&mut self, action: &[f64], next_step: &TimeStep, critic: &V) -> Observed
    where
        V: ValueEstimator + ?Sized,
    {
        let Some(prev) = self.prev_observation.replace(next_step.observation.clone()) else {
            panic!("`observe` called before `observe_first`");
        };

        if self.phase == Phase::FinishingEpisode {
            trace!("discarding step {} of an episode past the epoch boundary", next_step.number);
            return Observed::Discarded;
        }

        let value = critic.estimate(&prev);
        if let Err(err) = self.buffer.store(&prev, action, next_step.reward, value) {
            panic!("epoch invariant violated: {}", err);
        }
        self.current_epoch_step += 1;

        let epoch_full = self.is_full();
        if !next_step.is_last() && !epoch_full {
            return Observed::Stored;
        }

        let bootstrap = if next_step.is_terminal() {
            0.0
        } else {
            critic.estimate(&next_step.observation)
        };
        self.buffer.finish_path(bootstrap);
        debug!(
            "path finished at epoch step {} with bootstrap {}",
            self.current_epoch_step, bootstrap
        );

        if epoch_full && self.finish_episode_on_epoch_end && !next_step.is_last() {
            self.phase = Phase::FinishingEpisode;
        }

        Observed::PathFinished {
            bootstrap,
            epoch_full,
        }
    }

    /// Mark the end of the current episode so the next one records into the open epoch
    pub fn end_episode(&mut self) {
        self.phase = Phase::Collecting;
        self.prev_observation = None;
    }

    /// Pull the finished epoch out of the buffer
    ///
    /// **Returns** `None` unless a full epoch has been recorded and no episode is being finished.
    /// On success the epoch counter is reset and [`completed_epochs`](Self::completed_epochs)
    /// advances.
    pub fn take_batch(&mut self) -> Option<Batch<'_>> {
        if !self.is_ready() {
            return None;
        }
        self.current_epoch_step = 0;
        self.completed_epochs += 1;
        debug!("epoch {} complete", self.completed_epochs);

        match self.buffer.get() {
            Ok(batch) => Some(batch),
            Err(err) => panic!("epoch invariant violated: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(epoch_length: usize, finish: bool) -> EpochController {
        let config = EpochConfig::new()
            .with_epoch_length(epoch_length)
            .with_gamma(0.9)
            .with_lambda(1.0)
            .with_finish_episode_on_epoch_end(finish);
        EpochController::new(&config, 1, 1).unwrap()
    }

    fn critic(obs: &[f64]) -> f64 {
        obs[0] * 10.0
    }

    fn mid(x: f64, n: usize) -> TimeStep {
        TimeStep::mid(vec![x], 1.0, 1.0, n)
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EpochConfig::new().with_epoch_length(0);
        assert!(EpochController::new(&config, 1, 1).is_err());
    }

    #[test]
    fn terminal_episode_bootstraps_zero() {
        let mut ctl = controller(10, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        assert_eq!(ctl.observe(&[0.0], &mid(1.0, 1), &critic), Observed::Stored);
        assert_eq!(
            ctl.observe(&[0.0], &TimeStep::terminal(vec![2.0], 1.0, 2), &critic),
            Observed::PathFinished {
                bootstrap: 0.0,
                epoch_full: false
            }
        );
        assert_eq!(ctl.current_epoch_step(), 2);
        assert_eq!(ctl.buffer().path_start(), 2, "path closed");
        assert_eq!(ctl.phase(), Phase::Collecting);
    }

    #[test]
    fn truncated_episode_bootstraps_value() {
        let mut ctl = controller(10, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        let outcome = ctl.observe(&[0.0], &TimeStep::truncated(vec![0.5], 1.0, 1.0, 1), &critic);
        assert_eq!(
            outcome,
            Observed::PathFinished {
                bootstrap: 5.0,
                epoch_full: false
            }
        );
    }

    #[test]
    fn epoch_fill_discards_rest_of_episode() {
        let mut ctl = controller(2, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[0.0], &mid(1.0, 1), &critic);
        assert_eq!(
            ctl.observe(&[0.0], &mid(2.0, 2), &critic),
            Observed::PathFinished {
                bootstrap: 20.0,
                epoch_full: true
            }
        );
        assert_eq!(ctl.phase(), Phase::FinishingEpisode);

        let pos = ctl.buffer().len();
        for n in 3..6 {
            assert_eq!(ctl.observe(&[0.0], &mid(n as f64, n), &critic), Observed::Discarded);
            assert_eq!(ctl.buffer().len(), pos, "write position untouched");
        }
        assert_eq!(
            ctl.observe(&[0.0], &TimeStep::terminal(vec![0.0], 1.0, 6), &critic),
            Observed::Discarded
        );
        assert_eq!(ctl.current_epoch_step(), 2, "nothing recorded past the boundary");

        ctl.end_episode();
        assert_eq!(ctl.phase(), Phase::Collecting);
        assert!(ctl.take_batch().is_some(), "full epoch");
        assert_eq!(ctl.completed_epochs(), 1);
        assert_eq!(ctl.current_epoch_step(), 0);

        ctl.observe_first(&TimeStep::first(vec![0.0]));
        assert_eq!(ctl.observe(&[0.0], &mid(1.0, 1), &critic), Observed::Stored);
        assert_eq!(ctl.buffer().len(), 1, "recording resumes");
    }

    #[test]
    fn batch_waits_for_straddling_episode() {
        let mut ctl = controller(2, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[0.0], &mid(1.0, 1), &critic);
        ctl.observe(&[0.0], &mid(2.0, 2), &critic);
        assert_eq!(ctl.current_epoch_step(), ctl.epoch_length());
        assert!(!ctl.is_ready(), "episode still running");
        assert!(ctl.take_batch().is_none());
        assert_eq!(ctl.completed_epochs(), 0);

        assert_eq!(ctl.observe(&[0.0], &mid(3.0, 3), &critic), Observed::Discarded);
        assert_eq!(ctl.phase(), Phase::FinishingEpisode, "still discarding");
        assert_eq!(ctl.buffer().len(), 2, "write position untouched");

        ctl.end_episode();
        assert!(ctl.is_ready());
        let batch = ctl.take_batch().unwrap();
        assert_eq!(batch.observations, [0.0, 1.0], "the tail never reached the buffer");
        assert_eq!(ctl.phase(), Phase::Collecting);
        assert_eq!(ctl.current_epoch_step(), 0);
    }

    #[test]
    fn epoch_fill_without_finishing_keeps_collecting() {
        let mut ctl = controller(2, false);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[0.0], &mid(1.0, 1), &critic);
        ctl.observe(&[0.0], &mid(2.0, 2), &critic);
        assert_eq!(ctl.phase(), Phase::Collecting);
        assert!(ctl.take_batch().is_some());

        assert_eq!(ctl.observe(&[0.0], &mid(3.0, 3), &critic), Observed::Stored);
        assert_eq!(ctl.buffer().len(), 1, "episode continues into the next epoch");
    }

    #[test]
    fn episode_ending_on_epoch_boundary() {
        let mut ctl = controller(2, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[0.0], &mid(1.0, 1), &critic);
        let outcome = ctl.observe(&[0.0], &TimeStep::terminal(vec![2.0], 1.0, 2), &critic);
        assert_eq!(
            outcome,
            Observed::PathFinished {
                bootstrap: 0.0,
                epoch_full: true
            }
        );
        assert_eq!(ctl.phase(), Phase::Collecting, "episode ended by itself");
    }

    #[test]
    fn take_batch_waits_for_full_epoch() {
        let mut ctl = controller(3, true);
        assert!(ctl.take_batch().is_none());
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[1.0], &TimeStep::terminal(vec![1.0], 1.0, 1), &critic);
        ctl.end_episode();
        assert!(ctl.take_batch().is_none(), "one of three steps");
        assert_eq!(ctl.completed_epochs(), 0);
    }

    #[test]
    fn batch_contents_span_episodes() {
        let mut ctl = controller(3, true);
        ctl.observe_first(&TimeStep::first(vec![0.0]));
        ctl.observe(&[1.0], &TimeStep::terminal(vec![0.1], -1.0, 1), &critic);
        ctl.end_episode();
        ctl.observe_first(&TimeStep::first(vec![0.2]));
        ctl.observe(&[0.0], &mid(0.3, 1), &critic);
        ctl.observe(&[1.0], &mid(0.4, 2), &critic);

        let batch = ctl.take_batch().unwrap();
        assert_eq!(batch.observations, [0.0, 0.2, 0.3]);
        assert_eq!(batch.actions, [1.0, 0.0, 1.0]);
        assert!((batch.returns[0] + 1.0).abs() < 1e-12, "terminal path");
        assert!(
            (batch.returns[2] - (1.0 + 0.9 * 4.0)).abs() < 1e-12,
            "cut-off path bootstraps from the critic"
        );
    }

    #[test]
    #[should_panic(expected = "observe_first")]
    fn observe_requires_first_step() {
        let mut ctl = controller(3, true);
        ctl.observe(&[0.0], &mid(1.0, 1), &critic);
    }
}
