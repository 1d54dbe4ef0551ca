use gym_rs::{
    core::{ActionReward, Env},
    envs::classical_control::cartpole::{CartPoleEnv, CartPoleObservation},
    utils::renderer::RenderMode,
};

use crate::env::{DiscreteActionSpace, Environment, TimeStep};

fn obs2vec(observation: CartPoleObservation) -> Vec<f64> {
    Vec::from(observation)
}

/// The classic CartPole reinforcement learning environment
///
/// Observations are `[cart position, cart velocity, pole angle, pole angular velocity]`; action `0`
/// pushes the cart left and `1` pushes it right. Every step is worth a reward of one.
///
/// This implementation is a thin wrapper around [gym_rs](https://github.com/MathisWellmann/gym-rs).
/// Wrap it in a [`StepLimit`](crate::env::StepLimit) to cap episode length.
#[derive(Debug, Clone)]
pub struct CartPole {
    gym_env: CartPoleEnv,
    steps: usize,
}

impl CartPole {
    pub fn new(render_mode: RenderMode) -> Self {
        Self {
            gym_env: CartPoleEnv::new(render_mode),
            steps: 0,
        }
    }
}

impl Environment for CartPole {
    fn observation_dim(&self) -> usize {
        4
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn reset(&mut self) -> TimeStep {
        self.steps = 0;
        TimeStep::first(obs2vec(self.gym_env.reset(None, false, None).0))
    }

    fn step(&mut self, action: &[f64]) -> TimeStep {
        let ActionReward {
            observation,
            reward,
            done,
            ..
        } = self.gym_env.step(action[0] as usize);
        self.steps += 1;

        let observation = obs2vec(observation);
        if done {
            TimeStep::terminal(observation, *reward, self.steps)
        } else {
            TimeStep::mid(observation, *reward, 1.0, self.steps)
        }
    }
}

impl DiscreteActionSpace for CartPole {
    fn num_actions(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obs2vec_functional() {
        let obs = CartPoleObservation::new(0.0.into(), 1.0.into(), 2.0.into(), 3.0.into());
        assert_eq!(obs2vec(obs), [0.0, 1.0, 2.0, 3.0], "obs2vec conversion works");
    }

    #[test]
    fn episode_ends() {
        let mut env = CartPole::new(RenderMode::None);
        assert!(env.reset().is_first());

        // Pushing the same way every step topples the pole
        let mut step = env.step(&[1.0]);
        while !step.is_last() {
            step = env.step(&[1.0]);
        }
        assert!(step.is_terminal(), "pole fell");
        assert!(step.number < 200);
    }
}
