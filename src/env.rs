use crate::error::ConfigError;

/// Position of a [`TimeStep`] within its episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// The first step of an episode, produced by [`Environment::reset`]
    First,
    /// Any step that neither starts nor ends the episode
    Mid,
    /// The final step of an episode
    Last,
}

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// A terminal state was reached, so the continuation return is exactly zero
    Terminal,
    /// The episode was cut off (e.g. by a step limit) in a non-terminal state
    Truncated,
    /// The episode has not ended
    Ongoing,
}

/// A single step of interaction produced by an [`Environment`]
///
/// `reward` and `discount` describe the transition *into* `observation`; on a `First` step both are
/// meaningless and set to `0.0` and `1.0` respectively.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub discount: f64,
    pub kind: StepKind,
    pub end: EndKind,
    /// Index of this step within its episode, starting at 0
    pub number: usize,
}

impl TimeStep {
    /// The first step of an episode
    pub fn first(observation: Vec<f64>) -> Self {
        Self {
            observation,
            reward: 0.0,
            discount: 1.0,
            kind: StepKind::First,
            end: EndKind::Ongoing,
            number: 0,
        }
    }

    /// An intermediate step
    pub fn mid(observation: Vec<f64>, reward: f64, discount: f64, number: usize) -> Self {
        Self {
            observation,
            reward,
            discount,
            kind: StepKind::Mid,
            end: EndKind::Ongoing,
            number,
        }
    }

    /// The last step of an episode that reached a terminal state
    pub fn terminal(observation: Vec<f64>, reward: f64, number: usize) -> Self {
        Self {
            observation,
            reward,
            discount: 0.0,
            kind: StepKind::Last,
            end: EndKind::Terminal,
            number,
        }
    }

    /// The last step of an episode that was cut off before reaching a terminal state
    pub fn truncated(observation: Vec<f64>, reward: f64, discount: f64, number: usize) -> Self {
        Self {
            observation,
            reward,
            discount,
            kind: StepKind::Last,
            end: EndKind::Truncated,
            number,
        }
    }

    pub fn is_first(&self) -> bool {
        self.kind == StepKind::First
    }

    pub fn is_last(&self) -> bool {
        self.kind == StepKind::Last
    }

    /// Whether the episode ended in a true terminal state
    pub fn is_terminal(&self) -> bool {
        self.is_last() && self.end == EndKind::Terminal
    }

    /// Whether the episode was cut off in a non-terminal state
    pub fn is_truncated(&self) -> bool {
        self.is_last() && self.end == EndKind::Truncated
    }
}

/// Represents a Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// Observations and actions are flat `f64` vectors. Discrete actions are encoded as a single
/// element holding the action index.
pub trait Environment {
    /// Length of every observation vector
    fn observation_dim(&self) -> usize;

    /// Length of every action vector
    fn action_dim(&self) -> usize;

    /// Reset the environment to an initial state
    ///
    /// **Returns** a [`StepKind::First`] time step
    fn reset(&mut self) -> TimeStep;

    /// Update the environment in response to an action taken by an agent
    ///
    /// Calling `step` after a [`StepKind::Last`] step without an intervening `reset` is a logic error.
    fn step(&mut self, action: &[f64]) -> TimeStep;
}

/// An environment with a finite set of actions `0..num_actions`
pub trait DiscreteActionSpace: Environment {
    fn num_actions(&self) -> usize;

    /// Checks that a network reading `inputs` features and scoring `outputs` actions can act in
    /// this environment
    fn check_network(&self, inputs: usize, outputs: usize) -> Result<(), ConfigError> {
        if inputs != self.observation_dim() {
            return Err(ConfigError::Dimension {
                field: "observation_dim",
                expected: inputs,
                found: self.observation_dim(),
            });
        }
        if outputs != self.num_actions() {
            return Err(ConfigError::Dimension {
                field: "num_actions",
                expected: outputs,
                found: self.num_actions(),
            });
        }
        Ok(())
    }
}

/// Cuts episodes off after a fixed number of steps
///
/// The step that reaches the limit is turned into a [`EndKind::Truncated`] last step unless the
/// wrapped environment already ended the episode there.
#[derive(Debug, Clone)]
pub struct StepLimit<E> {
    env: E,
    limit: usize,
    steps: usize,
}

impl<E: Environment> StepLimit<E> {
    /// **Panics** if `limit` is zero
    pub fn new(env: E, limit: usize) -> Self {
        assert!(limit > 0, "step limit must be positive");
        Self {
            env,
            limit,
            steps: 0,
        }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: Environment> Environment for StepLimit<E> {
    fn observation_dim(&self) -> usize {
        self.env.observation_dim()
    }

    fn action_dim(&self) -> usize {
        self.env.action_dim()
    }

    fn reset(&mut self) -> TimeStep {
        self.steps = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &[f64]) -> TimeStep {
        self.steps += 1;
        let mut step = self.env.step(action);
        if self.steps >= self.limit && !step.is_last() {
            step.kind = StepKind::Last;
            step.end = EndKind::Truncated;
        }
        step
    }
}

impl<E: DiscreteActionSpace> DiscreteActionSpace for StepLimit<E> {
    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }
}
