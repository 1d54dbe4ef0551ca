use burn::{module::AutodiffModule, optim::Optimizer, prelude::*, tensor::backend::AutodiffBackend};
use log::info;

use super::vpg::{TargetCritic, VpgAgent, VpgConfig};
use crate::{
    approx::{ModuleParams, Network},
    error::ConfigError,
    target::TargetSynchronizer,
};

/// Configuration for a vanilla actor-critic agent (see [`VpgAgent::actor_critic`])
#[derive(Config, Debug)]
pub struct VacConfig {
    pub vpg: VpgConfig,
    /// Polyak coefficient of the target critic; `1.0` copies the critic outright
    #[config(default = 0.01)]
    pub tau: f64,
    /// Critic gradient steps between target updates
    #[config(default = 1)]
    pub target_update_interval: usize,
}

/// A vanilla actor-critic agent: a [`VpgAgent`] whose value estimates come from a target critic
pub type VacAgent<B, P, V, PO, VO> = VpgAgent<B, P, V, PO, VO>;

impl<B, P, V, PO, VO> VpgAgent<B, P, V, PO, VO>
where
    B: AutodiffBackend,
    P: Network<B> + AutodiffModule<B>,
    V: Network<B> + AutodiffModule<B>,
    PO: Optimizer<P, B>,
    VO: Optimizer<V, B>,
{
    /// Initialize an actor-critic agent
    ///
    /// Values for advantages and bootstraps are estimated by `target_critic`, which trails `critic`
    /// after every critic gradient step. Pass a clone of `critic` to start them level. Fails if the
    /// two critics do not have the same parameter shapes.
    pub fn actor_critic(
        policy: P,
        critic: V,
        target_critic: V,
        policy_optimizer: PO,
        critic_optimizer: VO,
        config: &VacConfig,
        device: B::Device,
    ) -> Result<Self, ConfigError> {
        let synchronizer = TargetSynchronizer::new(config.tau, config.target_update_interval)?;
        let network = ModuleParams::new(target_critic);
        TargetSynchronizer::check(&ModuleParams::new(critic.clone()), &network)?;

        let mut agent = Self::new(
            policy,
            critic,
            policy_optimizer,
            critic_optimizer,
            &config.vpg,
            device,
        )?;
        info!(
            "target critic with tau {} every {} critic steps",
            synchronizer.tau(),
            synchronizer.update_interval()
        );
        agent.target_critic = Some(TargetCritic {
            network,
            synchronizer,
        });
        Ok(agent)
    }
}
