pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod rl;
pub mod services;

pub use analysis::{InferenceReport, PerformanceSummary};
pub use config::AppConfig;
pub use data::{BenchmarkSeries, PriceHistory, PriceHistoryProvider};
pub use error::{GraphfolioError, Result};
pub use rl::{
    AllocationAgent, GraphBuilder, GraphSnapshot, InferencePolicy, PortfolioEnvironment, RLConfig,
};
pub use services::{AllocationService, TrainingState, TrainingStatus};
