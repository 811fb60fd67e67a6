//! Single-weight delta rule over the mapped record
//!
//! No numeric guards: NaN and overflow propagate into the record as-is.

use tracing::debug;

use crate::error::StorageError;
use crate::memory::StateStore;

/// Decay applied to the running reward on every observation
pub const REWARD_DECAY: f64 = 0.99;

/// What a single update did, for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub prediction: f64,
    pub error: f64,
    pub weight: f64,
    pub bias: f64,
    pub running_reward: f64,
}

/// `y = weight * x + bias`
pub fn predict(store: &StateStore, x: f64) -> f64 {
    store.weight() * x + store.bias()
}

/// Apply one delta-rule step and flush the record
pub fn observe_reward(
    store: &mut StateStore,
    x: f64,
    reward: f64,
    learning_rate: f64,
) -> Result<Observation, StorageError> {
    let prediction = predict(store, x);
    let error = reward - prediction;

    let weight = store.weight() + learning_rate * error * x;
    let bias = store.bias() + learning_rate * error;
    let running_reward = REWARD_DECAY * store.running_reward() + (1.0 - REWARD_DECAY) * reward;

    store.set_weight(weight);
    store.set_bias(bias);
    store.set_running_reward(running_reward);
    store.flush()?;

    debug!(
        "observe x={:.4} reward={:.4} prediction={:.4} error={:.4}",
        x, reward, prediction, error
    );

    Ok(Observation {
        prediction,
        error,
        weight,
        bias,
        running_reward,
    })
}
