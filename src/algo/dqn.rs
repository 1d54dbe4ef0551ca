use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    agent::Agent,
    approx::{to_vec, Indices, ModuleParams, Network, Rows, ToTensor},
    decay::{self, Decay},
    env::{DiscreteActionSpace, TimeStep},
    error::ConfigError,
    exploration::{Choice, EpsilonGreedy},
    memory::{ReplayMemory, Transition},
    target::TargetSynchronizer,
    util::{check_count, check_interval, check_left_open},
};

/// Configuration for a [`DeepQAgent`]
#[derive(Config, Debug)]
pub struct DeepQConfig {
    /// Maximum number of transitions in the replay memory
    #[config(default = 50000)]
    pub capacity: usize,
    /// Transitions per learning step
    #[config(default = 128)]
    pub batch_size: usize,
    /// Transitions to collect before the first learning step
    #[config(default = 1000)]
    pub min_replay_size: usize,
    /// The discount factor
    #[config(default = 0.99)]
    pub gamma: f64,
    /// Polyak coefficient of the target network; `1.0` copies the policy network outright
    #[config(default = 5.0e-3)]
    pub tau: f64,
    /// Gradient steps between target network updates
    #[config(default = 1)]
    pub target_update_interval: usize,
    /// Learning rate of the optimizer
    #[config(default = 1.0e-3)]
    pub lr: f64,
    /// Exploration rate at the first step
    #[config(default = 1.0)]
    pub epsilon_start: f64,
    /// Exploration rate in the limit
    #[config(default = 0.05)]
    pub epsilon_end: f64,
    /// Exponential decay rate of the exploration rate, per environment step
    ///
    /// The `epsilon_*` fields are ignored by [`DeepQAgent::with_exploration`]
    #[config(default = 1.0e-3)]
    pub epsilon_decay: f64,
    /// Seed for exploration and replay sampling
    #[config(default = 0)]
    pub seed: u64,
}

/// Diagnostics of one learning step
#[derive(Debug, Clone, PartialEq)]
pub struct DeepQReport {
    /// Mean squared TD error of the sampled batch
    pub loss: f64,
    /// Whether the target network was updated after this step
    pub synced: bool,
    /// Environment steps taken so far
    pub total_steps: u64,
}

/// A Deep Q Network agent over a discrete action space
///
/// Transitions are stored in a [`ReplayMemory`] and each [`Agent::step`] regresses the policy network
/// onto `r + discount · max_a Q′(s′, a)`, where `Q′` is a target network kept trailing the policy
/// network by a [`TargetSynchronizer`].
///
/// ### Generics
/// - `B`: A burn autodiff backend
/// - `M`: The Q network, mapping observations to one value per action
/// - `O`: An [`Optimizer`]
/// - `D`: The [`Decay`] schedule of the exploration rate
pub struct DeepQAgent<B, M, O, D = decay::Exponential>
where
    B: AutodiffBackend,
    D: Decay,
{
    policy_net: M,
    target_net: ModuleParams<B, M>,
    memory: ReplayMemory,
    optimizer: O,
    loss: MseLoss<B>,
    exploration: EpsilonGreedy<D>,
    synchronizer: TargetSynchronizer,
    gamma: f64,
    lr: f64,
    num_actions: usize,
    total_steps: u64,
    device: B::Device,
    rng: StdRng,
    prev_observation: Option<Vec<f64>>,
    /// The last transition, waiting for the action taken from its next state
    pending: Option<Transition>,
    /// Environment step of the last gradient step
    last_update: Option<u64>,
}

impl<B, M, O> DeepQAgent<B, M, O>
where
    B: AutodiffBackend,
    M: Network<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    /// Initialize a new `DeepQAgent`, with the target network starting as a copy of `model`
    ///
    /// Epsilon decays exponentially from `epsilon_start` to `epsilon_end`.
    pub fn new(
        model: M,
        optimizer: O,
        config: &DeepQConfig,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        let exploration = EpsilonGreedy::new(decay::Exponential::new(
            config.epsilon_decay,
            config.epsilon_start,
            config.epsilon_end,
        )?);
        Self::with_exploration(model, optimizer, exploration, config, device)
    }
}

impl<B, M, O, D> DeepQAgent<B, M, O, D>
where
    B: AutodiffBackend,
    M: Network<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
    D: Decay,
{
    /// Initialize a `DeepQAgent` exploring on a custom epsilon schedule
    pub fn with_exploration(
        model: M,
        optimizer: O,
        exploration: EpsilonGreedy<D>,
        config: &DeepQConfig,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        check_interval("gamma", config.gamma, 0.0, 1.0)?;
        check_left_open("lr", config.lr, 0.0, f64::INFINITY)?;
        check_count("num_actions", model.output_dim(), 1)?;
        check_interval("epsilon", exploration.epsilon(0), 0.0, 1.0)?;

        let memory = ReplayMemory::new(
            config.capacity,
            config.batch_size,
            config.min_replay_size,
            model.input_dim(),
            1,
        )?;
        let synchronizer = TargetSynchronizer::new(config.tau, config.target_update_interval)?;

        Ok(Self {
            target_net: ModuleParams::new(model.clone()),
            num_actions: model.output_dim(),
            policy_net: model,
            memory,
            optimizer,
            loss: MseLoss::new(),
            exploration,
            synchronizer,
            gamma: config.gamma,
            lr: config.lr,
            total_steps: 0,
            device,
            rng: StdRng::seed_from_u64(config.seed),
            prev_observation: None,
            pending: None,
            last_update: None,
        })
    }

    pub fn policy_net(&self) -> &M {
        &self.policy_net
    }

    pub fn target_net(&self) -> &M {
        self.target_net.module()
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// The exploration rate at the current step
    pub fn epsilon(&self) -> f64 {
        self.exploration.epsilon(self.total_steps)
    }

    /// Checks that the Q network reads `env`'s observations and scores each of its actions
    pub fn check_env<E: DiscreteActionSpace>(&self, env: &E) -> Result<(), ConfigError> {
        env.check_network(self.policy_net.input_dim(), self.num_actions)
    }

    /// Q values of every action in `observation`
    pub fn q_values(&self, observation: &[f64]) -> Vec<f64> {
        let input = Rows::new(observation, self.policy_net.input_dim()).to_tensor(&self.device);
        to_vec(self.policy_net.forward(input))
    }

    fn greedy_action(&self, observation: &[f64]) -> usize {
        self.q_values(observation)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i)
    }

    /// **Panics** if the transition does not fit the memory, which means the environment and
    /// the network disagree on the observation size
    fn remember(&mut self, transition: Transition) {
        if let Err(err) = self.memory.add(transition) {
            panic!("transition rejected by replay memory: {}", err);
        }
    }

    fn update_target(&mut self) -> bool {
        let online = ModuleParams::new(self.policy_net.clone());
        match self.synchronizer.maybe_sync(&online, &mut self.target_net) {
            Ok(synced) => synced,
            Err(err) => panic!("policy and target networks diverged: {}", err),
        }
    }
}

impl<B, M, O, D> Agent for DeepQAgent<B, M, O, D>
where
    B: AutodiffBackend,
    M: Network<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
    D: Decay,
{
    type Report = DeepQReport;

    fn observe_first(&mut self, step: &TimeStep) {
        self.prev_observation = Some(step.observation.clone());
    }

    /// Invoke the policy network along with the exploration strategy to choose an action
    fn select_action(&mut self, step: &TimeStep) -> Vec<f64> {
        let action = match self.exploration.choose(self.total_steps, &mut self.rng) {
            Choice::Explore => self.rng.gen_range(0..self.num_actions),
            Choice::Exploit => self.greedy_action(&step.observation),
        };
        let action = vec![action as f64];

        if let Some(mut transition) = self.pending.take() {
            transition.next_action = action.clone();
            self.remember(transition);
        }
        action
    }

    /// **Panics** if called before [`observe_first`](Agent::observe_first)
    fn observe(&mut self, action: &[f64], next_step: &TimeStep) {
        let Some(state) = self
            .prev_observation
            .replace(next_step.observation.clone())
        else {
            panic!("observe called before observe_first");
        };

        let discount = if next_step.is_terminal() {
            0.0
        } else {
            self.gamma * next_step.discount
        };
        let transition = Transition {
            state,
            action: action.to_vec(),
            next_state: next_step.observation.clone(),
            next_action: Vec::new(),
            reward: next_step.reward,
            discount,
        };

        if next_step.is_last() {
            self.remember(transition);
        } else {
            self.pending = Some(transition);
        }
        self.total_steps += 1;
    }

    fn end_episode(&mut self) {
        if let Some(transition) = self.pending.take() {
            self.remember(transition);
        }
        self.prev_observation = None;
    }

    /// Takes at most one gradient step per environment step
    fn step(&mut self) -> Option<DeepQReport> {
        if self.last_update == Some(self.total_steps) {
            return None;
        }
        let batch = match self.memory.sample(&mut self.rng) {
            Ok(batch) => batch,
            Err(err) => {
                debug!("skipping learning step: {}", err);
                return None;
            }
        };

        let obs_dim = self.policy_net.input_dim();
        let states: Tensor<B, 2> = Rows::new(&batch.states, obs_dim).to_tensor(&self.device);
        let actions: Tensor<B, 2, Int> = Indices(&batch.actions).to_tensor(&self.device);
        let next_states: Tensor<B, 2> =
            Rows::new(&batch.next_states, obs_dim).to_tensor(&self.device);
        let rewards: Tensor<B, 1> = batch.rewards.as_slice().to_tensor(&self.device);
        let discounts: Tensor<B, 1> = batch.discounts.as_slice().to_tensor(&self.device);

        // Q values of the chosen actions
        let q_values = self
            .policy_net
            .forward(states)
            .gather(1, actions)
            .squeeze::<1>(1);

        // Best value obtainable from each next state, according to the target network
        let next_q_values = self
            .target_net
            .module()
            .forward(next_states)
            .max_dim(1)
            .squeeze::<1>(1)
            .detach();
        let targets = rewards + discounts * next_q_values;

        let loss = self.loss.forward(q_values, targets, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.policy_net);
        self.policy_net = self
            .optimizer
            .step(self.lr, self.policy_net.clone(), grads);
        let synced = self.update_target();
        self.last_update = Some(self.total_steps);

        if synced && self.synchronizer.is_hard() {
            info!(
                "target network copied at step {} (loss {:.4}, epsilon {:.3})",
                self.total_steps,
                loss_value,
                self.epsilon()
            );
        }
        Some(DeepQReport {
            loss: loss_value,
            synced,
            total_steps: self.total_steps,
        })
    }
}
