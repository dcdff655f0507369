//! Episode Trajectory
//!
//! Per-step outputs of the policy kept attached to the autodiff graph until
//! the end-of-episode update.

use burn::prelude::*;

/// One environment step as seen by the learner
#[derive(Debug, Clone)]
pub struct TrajectoryStep<B: Backend> {
    /// Log-probability of the sampled weights, `[1]`
    pub log_prob: Tensor<B, 1>,
    /// Critic estimate, `[1]`
    pub value: Tensor<B, 1>,
    /// Policy entropy, `[1]`
    pub entropy: Tensor<B, 1>,
    pub reward: f32,
}

/// Ordered steps of a single episode
#[derive(Debug, Clone)]
pub struct Trajectory<B: Backend> {
    log_probs: Vec<Tensor<B, 1>>,
    values: Vec<Tensor<B, 1>>,
    entropies: Vec<Tensor<B, 1>>,
    rewards: Vec<f32>,
}

impl<B: Backend> Trajectory<B> {
    pub fn new() -> Self {
        Self {
            log_probs: Vec::new(),
            values: Vec::new(),
            entropies: Vec::new(),
            rewards: Vec::new(),
        }
    }

    pub fn push(&mut self, step: TrajectoryStep<B>) {
        self.log_probs.push(step.log_prob);
        self.values.push(step.value);
        self.entropies.push(step.entropy);
        self.rewards.push(step.reward);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    /// Concatenate the per-step tensors: `(log_probs, values, entropies)`,
    /// each `[len]`. Returns `None` for an empty trajectory.
    pub fn stacked(&self) -> Option<(Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>)> {
        if self.is_empty() {
            return None;
        }
        Some((
            Tensor::cat(self.log_probs.clone(), 0),
            Tensor::cat(self.values.clone(), 0),
            Tensor::cat(self.entropies.clone(), 0),
        ))
    }
}

impl<B: Backend> Default for Trajectory<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn step(reward: f32) -> TrajectoryStep<TestBackend> {
        let device = Default::default();
        TrajectoryStep {
            log_prob: Tensor::from_floats([reward * 0.1], &device),
            value: Tensor::from_floats([reward], &device),
            entropy: Tensor::from_floats([1.0], &device),
            reward,
        }
    }

    #[test]
    fn test_empty_trajectory() {
        let trajectory = Trajectory::<TestBackend>::new();
        assert!(trajectory.is_empty());
        assert!(trajectory.stacked().is_none());
    }

    #[test]
    fn test_stacked_preserves_order() {
        let mut trajectory = Trajectory::new();
        trajectory.push(step(1.0));
        trajectory.push(step(2.0));
        trajectory.push(step(3.0));

        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.total_reward(), 6.0);

        let (_, values, _) = trajectory.stacked().unwrap();
        assert_eq!(values.into_data().to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
