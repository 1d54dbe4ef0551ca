use std::error::Error;

use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::AdamConfig,
};
use gym_rs::utils::renderer::RenderMode;
use rollout_rl::{
    agent::run_episode,
    algo::{VacConfig, VpgAgent, VpgConfig},
    approx::{Mlp, MlpConfig},
    env::StepLimit,
    gym::CartPole,
    params::ParamSet,
    rollout::EpochConfig,
};

type VpgBackend = Autodiff<Wgpu>;

const NUM_EPOCHS: usize = 50;
const STEP_LIMIT: usize = 500;

fn main() -> Result<(), Box<dyn Error>> {
    let device = WgpuDevice::default();
    let mut env = StepLimit::new(CartPole::new(RenderMode::None), STEP_LIMIT);

    let policy: Mlp<VpgBackend> = MlpConfig::new(4, 2, vec![64, 64]).init(&device);
    let critic: Mlp<VpgBackend> = MlpConfig::new(4, 1, vec![64, 64]).init(&device);
    let config = VacConfig::new(VpgConfig::new(EpochConfig::new())).with_tau(0.05);

    let mut agent = VpgAgent::actor_critic(
        policy,
        critic.clone(),
        critic,
        AdamConfig::new().init::<VpgBackend, Mlp<VpgBackend>>(),
        AdamConfig::new().init::<VpgBackend, Mlp<VpgBackend>>(),
        &config,
        device,
    )?;
    agent.check_env(&env)?;

    let mut episode = 0;
    let mut returns = Vec::new();
    while agent.controller().completed_epochs() < NUM_EPOCHS {
        let summary = run_episode(&mut agent, &mut env);
        episode += 1;
        returns.push(summary.total_reward);

        for report in summary.reports {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            println!(
                "epoch {:>3} | episode {:>5} | mean return {:>7.2} | policy loss {:>8.4} | value loss {:>9.4}",
                report.epoch, episode, mean, report.policy_loss, report.value_loss
            );
            returns.clear();
        }
    }

    ParamSet::from_module(agent.policy()).save("vpg_cartpole_policy.json")?;
    Ok(())
}
