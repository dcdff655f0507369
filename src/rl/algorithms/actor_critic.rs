//! Advantage Actor-Critic
//!
//! Monte Carlo returns per episode, z-scored when the episode has more than
//! one step, and a single summed loss:
//!
//! ```text
//! loss = sum_t [ -log_prob_t * (R_t - V_t) + value_coef * (V_t - R_t)^2 - entropy_coef * H_t ]
//! ```
//!
//! The advantage uses a detached value so the actor term does not train the
//! critic.

use burn::prelude::*;
use burn::tensor::ElementConversion;

use crate::rl::config::AgentConfig;
use crate::rl::memory::Trajectory;

/// Added to the return std before dividing
pub const NORMALIZATION_EPS: f32 = 1e-8;

/// Loss components for logging
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorCriticOutput {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub total_loss: f32,
}

impl ActorCriticOutput {
    pub fn is_finite(&self) -> bool {
        self.total_loss.is_finite()
    }
}

/// Differentiable loss plus its host-side diagnostics
#[derive(Debug)]
pub struct ActorCriticLoss<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: ActorCriticOutput,
}

/// Backward discounted accumulation `R_t = r_t + gamma * R_{t+1}`
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0f32; rewards.len()];
    let mut running = 0.0f32;
    for t in (0..rewards.len()).rev() {
        running = rewards[t] + gamma * running;
        returns[t] = running;
    }
    returns
}

/// Z-score with sample std (n - 1); single-element slices are left raw
pub fn normalize_returns(returns: &mut [f32]) {
    let n = returns.len();
    if n < 2 {
        return;
    }

    let mean = returns.iter().sum::<f32>() / n as f32;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
    let std = var.sqrt() + NORMALIZATION_EPS;

    for r in returns.iter_mut() {
        *r = (*r - mean) / std;
    }
}

/// Build the episode loss; `None` when the trajectory is empty
pub fn actor_critic_loss<B: Backend>(
    trajectory: &Trajectory<B>,
    config: &AgentConfig,
    device: &B::Device,
) -> Option<ActorCriticLoss<B>> {
    let (log_probs, values, entropies) = trajectory.stacked()?;

    let mut returns = discounted_returns(trajectory.rewards(), config.gamma);
    normalize_returns(&mut returns);
    let len = returns.len();
    let returns = Tensor::<B, 1>::from_data(TensorData::new(returns, [len]), device);

    let advantages = returns.clone() - values.clone().detach();

    let policy_loss = (log_probs * advantages).sum().neg();
    let value_loss = (values - returns).powf_scalar(2.0).sum().mul_scalar(config.value_coef);
    let entropy = entropies.sum();
    let entropy_loss = entropy.clone().mul_scalar(-config.entropy_coef);

    let loss = policy_loss.clone() + value_loss.clone() + entropy_loss;

    let output = ActorCriticOutput {
        policy_loss: scalar(policy_loss),
        value_loss: scalar(value_loss),
        entropy: scalar(entropy),
        total_loss: scalar(loss.clone()),
    };

    Some(ActorCriticLoss { loss, output })
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::memory::TrajectoryStep;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_discounted_returns() {
        let returns = discounted_returns(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(returns, vec![1.75, 1.5, 1.0]);
    }

    #[test]
    fn test_normalize_returns_sample_std() {
        let mut returns = vec![1.0, 2.0, 3.0];
        normalize_returns(&mut returns);
        // mean 2, sample std 1
        assert!((returns[0] + 1.0).abs() < 1e-5);
        assert!(returns[1].abs() < 1e-6);
        assert!((returns[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_single_return_is_not_normalized() {
        let mut returns = vec![4.2];
        normalize_returns(&mut returns);
        assert_eq!(returns, vec![4.2]);
    }

    #[test]
    fn test_constant_returns_stay_finite() {
        let mut returns = vec![0.0; 10];
        normalize_returns(&mut returns);
        assert!(returns.iter().all(|r| r.is_finite() && *r == 0.0));
    }

    #[test]
    fn test_loss_matches_hand_computation() {
        let device = Default::default();
        let mut trajectory = Trajectory::<TestBackend>::new();
        trajectory.push(TrajectoryStep {
            log_prob: Tensor::from_floats([-1.0], &device),
            value: Tensor::from_floats([0.5], &device),
            entropy: Tensor::from_floats([2.0], &device),
            reward: 3.0,
        });

        let config = AgentConfig::default();
        let loss = actor_critic_loss(&trajectory, &config, &device).unwrap();

        // single step: R = 3, advantage = 2.5
        let policy = 2.5f32;
        let value = 0.5 * 2.5f32 * 2.5;
        let entropy = -0.01 * 2.0f32;
        assert!((loss.output.policy_loss - policy).abs() < 1e-5);
        assert!((loss.output.value_loss - value).abs() < 1e-5);
        assert!((loss.output.total_loss - (policy + value + entropy)).abs() < 1e-5);
    }

    #[test]
    fn test_empty_trajectory_has_no_loss() {
        let device = Default::default();
        let trajectory = Trajectory::<TestBackend>::new();
        assert!(actor_critic_loss(&trajectory, &AgentConfig::default(), &device).is_none());
    }
}
