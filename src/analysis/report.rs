//! Inference report: allocation, graph view and forward-looking metrics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::metrics::PERIODS_PER_YEAR;
use crate::data::PriceHistory;
use crate::rl::core::GraphSnapshot;
use crate::rl::graph::features::{mean, pct_returns, sample_std};
use crate::rl::training::ActionSample;

/// Trailing returns used by [`AllocationMetrics`]
pub const METRICS_LOOKBACK: usize = 20;

/// Weight assigned to one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Last-step return (node feature 0)
    #[serde(rename = "return")]
    pub last_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// Undirected view of a snapshot for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphView {
    /// Keeps each edge once, from the lower index to the higher one
    pub fn from_snapshot(assets: &[String], snapshot: &GraphSnapshot) -> Self {
        let nodes = assets
            .iter()
            .zip(&snapshot.node_features)
            .map(|(ticker, features)| GraphNode {
                id: ticker.clone(),
                last_return: features[0] as f64,
            })
            .collect();

        let edges = snapshot
            .edges
            .iter()
            .enumerate()
            .filter(|(_, (u, v))| u < v && *v < assets.len())
            .map(|(idx, (u, v))| GraphEdge {
                source: assets[*u].clone(),
                target: assets[*v].clone(),
                weight: snapshot.edge_weight(idx) as f64,
            })
            .collect();

        Self { nodes, edges }
    }
}

/// Annualized statistics of an allocation over recent history
///
/// Per-asset mean and volatility of the last [`METRICS_LOOKBACK`] daily
/// returns are annualized and combined linearly by weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationMetrics {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

impl AllocationMetrics {
    pub fn from_history(history: &PriceHistory, weights: &[f64]) -> Self {
        let mut expected_return = 0.0;
        let mut volatility = 0.0;

        for (idx, weight) in weights.iter().enumerate().take(history.num_assets()) {
            let returns = pct_returns(history.series(idx));
            let recent = &returns[returns.len().saturating_sub(METRICS_LOOKBACK)..];

            expected_return += weight * mean(recent) * PERIODS_PER_YEAR;
            volatility += weight * sample_std(recent) * PERIODS_PER_YEAR.sqrt();
        }

        let sharpe_ratio = if volatility > 0.0 {
            expected_return / volatility
        } else {
            0.0
        };

        Self {
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }
}

/// Everything a caller needs to display one inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceReport {
    pub as_of: Option<NaiveDate>,
    pub tickers: Vec<String>,
    pub allocations: Vec<Allocation>,
    /// Critic estimate for the snapshot
    pub value: f32,
    pub graph: GraphView,
    pub metrics: AllocationMetrics,
}

impl InferenceReport {
    pub fn new(history: &PriceHistory, snapshot: &GraphSnapshot, action: &ActionSample) -> Self {
        let tickers = history.assets().to_vec();
        let weights: Vec<f64> = action.weights.iter().map(|w| *w as f64).collect();

        let allocations = tickers
            .iter()
            .zip(&weights)
            .map(|(ticker, weight)| Allocation {
                ticker: ticker.clone(),
                weight: *weight,
            })
            .collect();

        Self {
            as_of: history.dates().last().copied(),
            graph: GraphView::from_snapshot(&tickers, snapshot),
            metrics: AllocationMetrics::from_history(history, &weights),
            allocations,
            value: action.value,
            tickers,
        }
    }

    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.allocations
            .iter()
            .find(|a| a.ticker == ticker)
            .map(|a| a.weight)
    }
}
