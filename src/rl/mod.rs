//! Reinforcement Learning Module
//!
//! Correlation-graph actor-critic allocation built on the Burn framework.
//!
//! # Components
//!
//! - **Graph**: per-step asset graphs from trailing close prices
//! - **Environment**: reset/step over history with a shaped excess-return reward
//! - **Networks**: two-layer graph convolution with actor and critic heads
//! - **Training**: Dirichlet action sampling and one guarded update per episode

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod graph;
pub mod memory;
pub mod networks;
pub mod training;

use burn::backend::{Autodiff, NdArray};

/// CPU backend used for inference and evaluation
pub type InferenceBackend = NdArray<f32>;

/// CPU backend with autodiff used for training
pub type TrainBackend = Autodiff<InferenceBackend>;

// Config exports
pub use config::{AgentConfig, GraphConfig, RLConfig, RewardConfig, TrainingConfig};

// Core exports
pub use core::{Dirichlet, ExcessReturnReward, GraphSnapshot, RewardFunction, RewardSignal, NODE_FEATURES};

// Graph exports
pub use graph::GraphBuilder;

// Environment exports
pub use environment::{PortfolioEnvironment, PortfolioState, StepInfo, StepResult};

// Network exports
pub use networks::{GnnPolicy, GnnPolicyConfig};

// Training exports
pub use training::{
    ActionSample, AllocationAgent, Checkpointer, EpisodeReport, EvaluationRun, InferencePolicy,
    TrainingSummary,
};
