use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{
        activation::{log_softmax, softmax},
        backend::AutodiffBackend,
        ElementConversion,
    },
};
use log::{debug, info};
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, SeedableRng};

use crate::{
    agent::Agent,
    approx::{to_vec, BurnApproximator, Indices, ModuleParams, Network, Rows, ToTensor},
    env::{DiscreteActionSpace, TimeStep},
    error::ConfigError,
    rollout::{EpochConfig, EpochController, Observed},
    target::TargetSynchronizer,
    util::{check_count, check_left_open},
};

/// Configuration for a [`VpgAgent`]
#[derive(Config, Debug)]
pub struct VpgConfig {
    /// Epoch length, discounting and episode boundary handling
    pub epoch: EpochConfig,
    /// Critic gradient steps per epoch
    #[config(default = 80)]
    pub value_iterations: usize,
    /// Learning rate of the policy optimizer
    #[config(default = 3.0e-4)]
    pub policy_lr: f64,
    /// Learning rate of the critic optimizer
    #[config(default = 1.0e-3)]
    pub value_lr: f64,
    /// Seed for action sampling
    #[config(default = 0)]
    pub seed: u64,
}

/// Diagnostics of one epoch update
#[derive(Debug, Clone, PartialEq)]
pub struct VpgReport {
    /// Number of epochs completed, this one included
    pub epoch: usize,
    /// Policy loss before the policy gradient step
    pub policy_loss: f64,
    /// Critic loss of the last value iteration
    pub value_loss: f64,
}

/// A slowly trailing copy of the critic, used to estimate values during collection
pub(super) struct TargetCritic<B: Backend, V> {
    pub(super) network: ModuleParams<B, V>,
    pub(super) synchronizer: TargetSynchronizer,
}

/// A vanilla policy gradient agent with a categorical policy and a learned critic
///
/// Experience is collected for a whole epoch through an [`EpochController`]; advantages come from
/// GAE-λ over the critic's estimates. Once the epoch is full, [`Agent::step`] takes one policy
/// gradient step and `value_iterations` critic regression steps on the rewards-to-go.
///
/// ### Generics
/// - `B`: A burn autodiff backend
/// - `P`: The policy network, mapping observations to one logit per action
/// - `V`: The critic network, mapping observations to a single value
/// - `PO`, `VO`: The optimizers of the policy and critic
pub struct VpgAgent<B, P, V, PO, VO>
where
    B: AutodiffBackend,
{
    policy: P,
    critic: V,
    pub(super) target_critic: Option<TargetCritic<B, V>>,
    policy_optimizer: PO,
    critic_optimizer: VO,
    controller: EpochController,
    loss: MseLoss<B>,
    value_iterations: usize,
    policy_lr: f64,
    value_lr: f64,
    device: B::Device,
    rng: StdRng,
}

impl<B, P, V, PO, VO> VpgAgent<B, P, V, PO, VO>
where
    B: AutodiffBackend,
    P: Network<B> + AutodiffModule<B>,
    V: Network<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
{
    /// Initialize a new `VpgAgent`
    ///
    /// The observation size is taken from the policy's input. Fails if the critic does not map
    /// that many features to one value, or if any hyperparameter is out of range.
    pub fn new(
        policy: P,
        critic: V,
        policy_optimizer: PO,
        critic_optimizer: VO,
        config: &VpgConfig,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        let obs_dim = policy.input_dim();
        if critic.input_dim() != obs_dim {
            return Err(ConfigError::Dimension {
                field: "critic input",
                expected: obs_dim,
                found: critic.input_dim(),
            });
        }
        if critic.output_dim() != 1 {
            return Err(ConfigError::Dimension {
                field: "critic output",
                expected: 1,
                found: critic.output_dim(),
            });
        }
        check_count("policy output", policy.output_dim(), 1)?;
        check_count("value_iterations", config.value_iterations, 1)?;
        check_left_open("policy_lr", config.policy_lr, 0.0, f64::INFINITY)?;
        check_left_open("value_lr", config.value_lr, 0.0, f64::INFINITY)?;

        Ok(Self {
            policy,
            critic,
            target_critic: None,
            policy_optimizer,
            critic_optimizer,
            controller: EpochController::new(&config.epoch, obs_dim, 1)?,
            loss: MseLoss::new(),
            value_iterations: config.value_iterations,
            policy_lr: config.policy_lr,
            value_lr: config.value_lr,
            device,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn critic(&self) -> &V {
        &self.critic
    }

    /// The target critic, for agents built with [`VpgAgent::actor_critic`]
    pub fn target_critic(&self) -> Option<&V> {
        self.target_critic.as_ref().map(|t| t.network.module())
    }

    pub fn controller(&self) -> &EpochController {
        &self.controller
    }

    /// Checks that the policy reads `env`'s observations and scores each of its actions
    pub fn check_env<E: DiscreteActionSpace>(&self, env: &E) -> Result<(), ConfigError> {
        env.check_network(self.policy.input_dim(), self.policy.output_dim())
    }

    /// Probabilities of every action in `observation`
    pub fn action_probs(&self, observation: &[f64]) -> Vec<f64> {
        let input = Rows::new(observation, self.policy.input_dim()).to_tensor(&self.device);
        to_vec(softmax(self.policy.forward(input), 1))
    }

    fn update_policy(
        &mut self,
        obs: Tensor<B, 2>,
        actions: Tensor<B, 2, Int>,
        advantages: Tensor<B, 1>,
    ) -> f64 {
        let log_probs = log_softmax(self.policy.forward(obs), 1)
            .gather(1, actions)
            .squeeze::<1>(1);
        let loss = (log_probs * advantages).mean().neg();
        let value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.policy);
        self.policy = self
            .policy_optimizer
            .step(self.policy_lr, self.policy.clone(), grads);
        value
    }

    fn update_critic(&mut self, obs: Tensor<B, 2>, returns: Tensor<B, 2>) -> f64 {
        let mut value = 0.0;
        for _ in 0..self.value_iterations {
            let loss = self.loss.forward(
                self.critic.forward(obs.clone()),
                returns.clone(),
                Reduction::Mean,
            );
            value = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &self.critic);
            self.critic = self
                .critic_optimizer
                .step(self.value_lr, self.critic.clone(), grads);

            if let Some(target) = &mut self.target_critic {
                let online = ModuleParams::new(self.critic.clone());
                if let Err(err) = target.synchronizer.maybe_sync(&online, &mut target.network) {
                    panic!("critic and target critic diverged: {}", err);
                }
            }
        }
        value
    }
}

impl<B, P, V, PO, VO> Agent for VpgAgent<B, P, V, PO, VO>
where
    B: AutodiffBackend,
    P: Network<B> + AutodiffModule<B>,
    V: Network<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
{
    type Report = VpgReport;

    fn observe_first(&mut self, step: &TimeStep) {
        self.controller.observe_first(step);
    }

    /// Sample an action index from the policy's categorical distribution
    ///
    /// **Panics** if the policy produces probabilities that are not finite
    fn select_action(&mut self, step: &TimeStep) -> Vec<f64> {
        let probs = self.action_probs(&step.observation);
        match WeightedIndex::new(&probs) {
            Ok(dist) => vec![dist.sample(&mut self.rng) as f64],
            Err(err) => panic!("invalid action probabilities {:?}: {}", probs, err),
        }
    }

    fn observe(&mut self, action: &[f64], next_step: &TimeStep) {
        let critic = match &self.target_critic {
            Some(target) => target.network.module(),
            None => &self.critic,
        };
        let estimator = BurnApproximator::new(critic, &self.device);
        if let Observed::PathFinished {
            bootstrap,
            epoch_full,
        } = self.controller.observe(action, next_step, &estimator)
        {
            debug!(
                "path finished with bootstrap {:.4} (epoch full: {})",
                bootstrap, epoch_full
            );
        }
    }

    fn end_episode(&mut self) {
        self.controller.end_episode();
    }

    fn step(&mut self) -> Option<VpgReport> {
        let batch = self.controller.take_batch()?;
        let obs: Tensor<B, 2> = Rows::new(batch.observations, batch.obs_dim).to_tensor(&self.device);
        let actions: Tensor<B, 2, Int> = Indices(batch.actions).to_tensor(&self.device);
        let advantages: Tensor<B, 1> = batch.advantages.to_tensor(&self.device);
        let returns: Tensor<B, 2> = Rows::new(batch.returns, 1).to_tensor(&self.device);

        let policy_loss = self.update_policy(obs.clone(), actions, advantages);
        let value_loss = self.update_critic(obs, returns);

        let report = VpgReport {
            epoch: self.controller.completed_epochs(),
            policy_loss,
            value_loss,
        };
        info!(
            "epoch {}: policy loss {:.4}, value loss {:.4}",
            report.epoch, report.policy_loss, report.value_loss
        );
        Some(report)
    }
}

#[cfg(test)]
pub(super) mod tests {
    use burn::optim::AdamConfig;

    use super::*;
    use crate::{
        agent::run_episode,
        approx::{
            tests::{device, TestBackend},
            Mlp, MlpConfig,
        },
        env::{tests::MockEnv, StepLimit},
        params::ParamSet,
    };

    pub(crate) type TestNet = Mlp<TestBackend>;

    pub(crate) fn optimizer() -> impl Optimizer<TestNet, TestBackend> {
        AdamConfig::new().init::<TestBackend, TestNet>()
    }

    pub(crate) fn networks(obs_dim: usize) -> (TestNet, TestNet) {
        let device = device();
        (
            MlpConfig::new(obs_dim, 2, vec![8]).init(&device),
            MlpConfig::new(obs_dim, 1, vec![8]).init(&device),
        )
    }

    pub(crate) fn config(epoch_length: usize) -> VpgConfig {
        VpgConfig::new(EpochConfig::new().with_epoch_length(epoch_length)).with_value_iterations(5)
    }

    fn build(
        policy: TestNet,
        critic: TestNet,
        config: &VpgConfig,
    ) -> Result<
        VpgAgent<
            TestBackend,
            TestNet,
            TestNet,
            impl Optimizer<TestNet, TestBackend>,
            impl Optimizer<TestNet, TestBackend>,
        >,
        ConfigError,
    > {
        VpgAgent::new(policy, critic, optimizer(), optimizer(), config, device())
    }

    fn agent(
        epoch_length: usize,
    ) -> VpgAgent<
        TestBackend,
        TestNet,
        TestNet,
        impl Optimizer<TestNet, TestBackend>,
        impl Optimizer<TestNet, TestBackend>,
    > {
        let (policy, critic) = networks(4);
        build(policy, critic, &config(epoch_length)).unwrap()
    }

    #[test]
    fn rejects_mismatched_critic() {
        let dev = device();
        let policy = MlpConfig::new(4, 2, vec![8]).init(&dev);

        let narrow = MlpConfig::new(3, 1, vec![8]).init(&dev);
        let result = build(policy.clone(), narrow, &config(8));
        assert!(matches!(
            result,
            Err(ConfigError::Dimension { field: "critic input", expected: 4, found: 3 })
        ));

        let wide = MlpConfig::new(4, 2, vec![8]).init(&dev);
        let result = build(policy, wide, &config(8));
        assert!(matches!(result, Err(ConfigError::Dimension { field: "critic output", .. })));
    }

    #[test]
    fn rejects_bad_hyperparameters() {
        let (policy, critic) = networks(4);
        let result = build(policy, critic, &config(8).with_policy_lr(0.0));
        assert!(matches!(result, Err(ConfigError::OutOfRange { field: "policy_lr", .. })));
    }

    #[test]
    fn checks_env_fit() {
        let agent = agent(8);
        assert_eq!(agent.check_env(&MockEnv::new(4)), Ok(()));
        assert!(matches!(
            agent.check_env(&StepLimit::new(MockEnv::new(3), 5)),
            Err(ConfigError::Dimension { field: "observation_dim", expected: 4, found: 3 })
        ));

        let (_, critic) = networks(4);
        let three_way = MlpConfig::new(4, 3, vec![8]).init(&device());
        let agent = build(three_way, critic, &config(8)).unwrap();
        assert!(matches!(
            agent.check_env(&MockEnv::new(4)),
            Err(ConfigError::Dimension { field: "num_actions", expected: 3, found: 2 })
        ));
    }

    #[test]
    fn actions_are_valid_indices() {
        let mut agent = agent(8);
        let step = TimeStep::first(vec![1.0, 0.0, 0.0, 0.0]);

        let probs = agent.action_probs(&step.observation);
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-5, "probabilities sum to one");

        for _ in 0..20 {
            let action = agent.select_action(&step);
            assert_eq!(action.len(), 1);
            assert!(action[0] == 0.0 || action[0] == 1.0, "action {:?}", action);
        }
    }

    #[test]
    fn learns_once_per_epoch() {
        let mut agent = agent(8);
        let mut env = StepLimit::new(MockEnv::new(4), 5);
        let before = ParamSet::from_module(agent.policy());

        let mut reports = Vec::new();
        let mut steps = 0;
        while steps < 24 {
            let summary = run_episode(&mut agent, &mut env);
            steps += summary.steps;
            reports.extend(summary.reports);
        }

        assert!(!reports.is_empty(), "at least one epoch completed");
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.epoch, i + 1, "epochs are numbered in order");
            assert!(report.policy_loss.is_finite() && report.value_loss.is_finite());
        }
        assert_eq!(agent.controller().completed_epochs(), reports.len());

        let after = ParamSet::from_module(agent.policy());
        assert!(after.l2_distance(&before) > 0.0, "policy was updated");
    }

    #[test]
    fn value_loss_reported_every_epoch() {
        let mut agent = agent(16);
        let mut env = StepLimit::new(MockEnv::new(4), 6);

        let mut losses = Vec::new();
        while losses.len() < 3 {
            for report in run_episode(&mut agent, &mut env).reports {
                losses.push(report.value_loss);
            }
        }
        assert!(losses.iter().all(|l| l.is_finite() && *l >= 0.0), "losses {:?}", losses);
    }
}
