//! Learning agents
//!
//! All of them implement [`Agent`](crate::agent::Agent) and are driven by
//! [`run_episode`](crate::agent::run_episode).

mod dqn;
mod vac;
mod vpg;

pub use dqn::{DeepQAgent, DeepQConfig, DeepQReport};
pub use vac::{VacAgent, VacConfig};
pub use vpg::{VpgAgent, VpgConfig, VpgReport};
