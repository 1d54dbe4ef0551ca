use log::debug;

use crate::env::{Environment, TimeStep};

/// An agent driven step by step through an [`Environment`]
///
/// Actions are flat `f64` vectors; discrete agents return a single element holding the action index.
/// The callbacks are invoked in the order [`run_episode`] shows: `observe_first` once, then
/// `select_action`, `observe` and `step` for every environment step, and `end_episode` followed by
/// a last `step` when the episode is over. Experience that only becomes usable once the episode
/// has ended is learned from in that last `step`.
pub trait Agent {
    /// Diagnostics of one learning step
    type Report;

    /// Record the first step of an episode
    fn observe_first(&mut self, step: &TimeStep);

    /// Choose the action to take from `step`
    fn select_action(&mut self, step: &TimeStep) -> Vec<f64>;

    /// Record the outcome of taking `action`
    fn observe(&mut self, action: &[f64], next_step: &TimeStep);

    /// Reset per-episode state
    fn end_episode(&mut self);

    /// Learn from recorded experience, if enough of it is available
    ///
    /// Must be called before the next `observe` once an episode has ended.
    fn step(&mut self) -> Option<Self::Report>;
}

/// Outcome of one [`run_episode`]
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary<R> {
    /// Environment steps taken
    pub steps: usize,
    /// Undiscounted sum of rewards
    pub total_reward: f64,
    /// Whether the episode was cut short rather than reaching a terminal state
    pub truncated: bool,
    /// Reports of the learning steps taken during the episode, in order
    pub reports: Vec<R>,
}

/// Deploy `agent` into `env` for one episode
pub fn run_episode<A, E>(agent: &mut A, env: &mut E) -> EpisodeSummary<A::Report>
where
    A: Agent + ?Sized,
    E: Environment + ?Sized,
{
    let mut step = env.reset();
    agent.observe_first(&step);

    let mut summary = EpisodeSummary {
        steps: 0,
        total_reward: 0.0,
        truncated: false,
        reports: Vec::new(),
    };

    loop {
        let action = agent.select_action(&step);
        let next = env.step(&action);
        agent.observe(&action, &next);

        summary.steps += 1;
        summary.total_reward += next.reward;
        if let Some(report) = agent.step() {
            summary.reports.push(report);
        }

        if next.is_last() {
            summary.truncated = next.is_truncated();
            break;
        }
        step = next;
    }

    agent.end_episode();
    if let Some(report) = agent.step() {
        summary.reports.push(report);
    }
    debug!(
        "episode finished after {} steps with return {:.3}",
        summary.steps, summary.total_reward
    );
    summary
}
