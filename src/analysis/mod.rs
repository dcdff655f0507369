//! Performance analysis for allocations and evaluation rollouts.

pub mod metrics;
pub mod report;

pub use metrics::{
    alpha_beta, max_drawdown, sharpe_ratio, AlphaBeta, PerformanceSummary, PERIODS_PER_YEAR,
    RISK_FREE_RATE,
};
pub use report::{
    Allocation, AllocationMetrics, GraphEdge, GraphNode, GraphView, InferenceReport,
    METRICS_LOOKBACK,
};
