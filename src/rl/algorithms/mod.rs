//! RL Algorithms
//!
//! Implementations of reinforcement learning algorithms.

pub mod actor_critic;

pub use actor_critic::{
    actor_critic_loss, discounted_returns, normalize_returns, ActorCriticLoss, ActorCriticOutput,
};
