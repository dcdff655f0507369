//! Training Infrastructure
//!
//! The actor-critic agent, checkpointing, and evaluation-mode inference.

pub mod agent;
pub mod checkpointing;
pub mod clipping;
pub mod evaluation;

pub use agent::{AllocationAgent, EpisodeReport, PolicyOptimizer, TrainingSummary};
pub use checkpointing::Checkpointer;
pub use clipping::{clip_grad_norm, global_grad_norm};
pub use evaluation::{ActionSample, EvaluationRun, InferencePolicy};
