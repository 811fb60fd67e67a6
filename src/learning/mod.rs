//! Online learning - a scalar delta rule against a synthetic reward
//!
//! Operates directly on the mapped [`StateStore`](crate::memory::StateStore);
//! every update is flushed before it returns.

pub mod delta;
pub mod reward;

pub use delta::{observe_reward, predict, Observation};
pub use reward::RewardSource;
