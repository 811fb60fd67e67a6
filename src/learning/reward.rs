//! Synthetic environment the learner is trained against

use rand::Rng;

use crate::config::LearningConfig;

/// Rewards inputs by a fixed target line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardSource {
    pub target_weight: f64,
    pub target_bias: f64,
}

impl RewardSource {
    pub fn new(target_weight: f64, target_bias: f64) -> Self {
        Self {
            target_weight,
            target_bias,
        }
    }

    pub fn from_config(config: &LearningConfig) -> Self {
        Self::new(config.target_weight, config.target_bias)
    }

    /// Draw an input in `[0, 1)`
    pub fn sample_input<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.random::<f64>()
    }

    pub fn reward(&self, x: f64) -> f64 {
        self.target_weight * x + self.target_bias
    }
}

impl Default for RewardSource {
    fn default() -> Self {
        Self::from_config(&LearningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_reward_follows_target_line() {
        let source = RewardSource::new(2.0, 1.0);
        assert_eq!(source.reward(0.0), 1.0);
        assert_eq!(source.reward(0.5), 2.0);
    }

    #[test]
    fn test_inputs_stay_in_unit_interval() {
        let source = RewardSource::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let x = source.sample_input(&mut rng);
            assert!((0.0..1.0).contains(&x));
        }
    }
}
