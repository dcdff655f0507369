//! Portfolio Environment for RL Training
//!
//! Steps an allocation through historical prices and scores it against a
//! benchmark.

mod portfolio;

pub use portfolio::{normalize_weights, PortfolioEnvironment, PortfolioState, StepInfo, StepResult};
