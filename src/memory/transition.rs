/// A single off-policy experience, built from two consecutive time steps
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The observation before taking the action
    pub state: Vec<f64>,
    /// The action taken in `state`
    pub action: Vec<f64>,
    /// The observation after the action is taken
    pub next_state: Vec<f64>,
    /// The action taken in `next_state`, or empty if the episode ended there
    pub next_action: Vec<f64>,
    /// The reward received after taking the action
    pub reward: f64,
    /// Multiplier for the bootstrapped value of `next_state`; zero if `next_state` is terminal
    pub discount: f64,
}

/// A zipped batch of [transitions](Transition) with each field flattened row-major
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionBatch {
    pub states: Vec<f64>,
    pub actions: Vec<f64>,
    pub rewards: Vec<f64>,
    pub discounts: Vec<f64>,
    pub next_states: Vec<f64>,
    /// Rows for transitions without a next action are filled with zeros
    pub next_actions: Vec<f64>,
    pub len: usize,
}

impl TransitionBatch {
    /// Zip an iterator of transitions into a batch
    ///
    /// `obs_dim` and `act_dim` size the rows; `batch_size` is only a capacity hint.
    pub fn from_iter<'a>(
        iter: impl IntoIterator<Item = &'a Transition>,
        batch_size: usize,
        obs_dim: usize,
        act_dim: usize,
    ) -> Self {
        let batch = Self {
            states: Vec::with_capacity(batch_size * obs_dim),
            actions: Vec::with_capacity(batch_size * act_dim),
            rewards: Vec::with_capacity(batch_size),
            discounts: Vec::with_capacity(batch_size),
            next_states: Vec::with_capacity(batch_size * obs_dim),
            next_actions: Vec::with_capacity(batch_size * act_dim),
            len: 0,
        };

        iter.into_iter().fold(batch, |mut b, t| {
            b.states.extend_from_slice(&t.state);
            b.actions.extend_from_slice(&t.action);
            b.rewards.push(t.reward);
            b.discounts.push(t.discount);
            b.next_states.extend_from_slice(&t.next_state);
            if t.next_action.is_empty() {
                b.next_actions.extend(std::iter::repeat(0.0).take(act_dim));
            } else {
                b.next_actions.extend_from_slice(&t.next_action);
            }
            b.len += 1;
            b
        })
    }
}
