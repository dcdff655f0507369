//! Core RL abstractions
//!
//! Graph observations, the Dirichlet action distribution, and rewards.

pub mod dirichlet;
pub mod reward;
pub mod snapshot;

pub use dirichlet::{sample_simplex, Dirichlet, MIN_WEIGHT};
pub use reward::{ExcessReturnReward, RewardFunction, RewardSignal, RewardTransition};
pub use snapshot::{GraphSnapshot, NODE_FEATURES};
