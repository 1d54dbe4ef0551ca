use std::error::Error;

use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::AdamWConfig,
};
use gym_rs::utils::renderer::RenderMode;
use rollout_rl::{
    agent::run_episode,
    algo::{DeepQAgent, DeepQConfig},
    approx::{Mlp, MlpConfig},
    env::StepLimit,
    gym::CartPole,
    params::ParamSet,
};

type DQNBackend = Autodiff<Wgpu>;

const NUM_EPISODES: u16 = 256;
const STEP_LIMIT: usize = 500;

fn main() -> Result<(), Box<dyn Error>> {
    let device = WgpuDevice::default();
    let mut env = StepLimit::new(CartPole::new(RenderMode::Human), STEP_LIMIT);

    let model: Mlp<DQNBackend> = MlpConfig::new(4, 2, vec![64, 128]).init(&device);
    let config = DeepQConfig::new();
    let optimizer = AdamWConfig::new().init::<DQNBackend, Mlp<DQNBackend>>();
    let mut agent = DeepQAgent::new(model, optimizer, &config, device)?;
    agent.check_env(&env)?;

    for i in 0..NUM_EPISODES {
        let summary = run_episode(&mut agent, &mut env);
        let loss = summary.reports.last().map_or(f64::NAN, |r| r.loss);
        println!(
            "episode {:>4} | steps {:>3} | epsilon {:.3} | loss {:>8.4}{}",
            i,
            summary.steps,
            agent.epsilon(),
            loss,
            if summary.truncated { " | truncated" } else { "" }
        );
    }

    ParamSet::from_module(agent.policy_net()).save("dqn_cartpole_q.json")?;
    Ok(())
}
