//! Correlation graph construction with a k-NN degree guarantee.

use tracing::trace;

use super::features::{correlation_matrix, momentum, pct_returns, rsi, sample_std};
use crate::data::PriceWindow;
use crate::rl::config::GraphConfig;
use crate::rl::core::{GraphSnapshot, NODE_FEATURES};

/// RSI reported when the indicator is undefined
const NEUTRAL_RSI: f64 = 50.0;

/// Builds per-step asset graphs from trailing close prices
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Build using the configured window size
    pub fn build(&self, window: &PriceWindow<'_>) -> GraphSnapshot {
        self.build_graph(window, self.config.window_size)
    }

    /// Build node features and edges from the trailing `window_size` rows
    ///
    /// Returns the zero snapshot when fewer than `window_size` rows are
    /// available. RSI is computed over every row supplied in `window`.
    pub fn build_graph(&self, window: &PriceWindow<'_>, window_size: usize) -> GraphSnapshot {
        let n = window.num_assets();
        let available = window.len();

        if window_size == 0 || available < window_size {
            trace!(available, window_size, "insufficient history, empty graph");
            return GraphSnapshot::empty(n);
        }

        let trailing: Vec<&[f64]> = window
            .iter()
            .map(|s| &s[s.len() - window_size..])
            .collect();
        let returns: Vec<Vec<f64>> = trailing.iter().map(|s| pct_returns(s)).collect();

        let node_features = (0..n)
            .map(|i| {
                let last_return = returns[i].last().copied().unwrap_or(0.0);
                let volatility = sample_std(&returns[i]);
                let window_momentum = momentum(trailing[i]);
                let rsi_value = rsi(window.series(i), self.config.rsi_period).unwrap_or(NEUTRAL_RSI);

                let row: [f64; NODE_FEATURES] =
                    [last_return, volatility, window_momentum, rsi_value / 100.0];
                row.map(|v| v as f32)
            })
            .collect();

        let corr = correlation_matrix(&returns);
        let (edges, edge_weights) = self.select_edges(&corr);

        GraphSnapshot {
            node_features,
            edges,
            edge_weights: Some(edge_weights),
        }
    }

    /// Per-source neighbor selection: threshold first, k-NN fallback
    fn select_edges(&self, corr: &[Vec<f64>]) -> (Vec<(usize, usize)>, Vec<f32>) {
        let n = corr.len();
        let k = self.config.min_neighbors;
        let threshold = self.config.correlation_threshold;

        let mut edges = Vec::new();
        let mut weights = Vec::new();

        for i in 0..n {
            let above: Vec<usize> = (0..n)
                .filter(|&j| j != i && corr[i][j].abs() > threshold)
                .collect();

            let neighbors = if above.len() >= k {
                above
            } else {
                let mut ranked: Vec<usize> = (0..n).filter(|&j| j != i).collect();
                // stable sort keeps ascending index among equal correlations
                ranked.sort_by(|&a, &b| {
                    corr[i][b]
                        .abs()
                        .partial_cmp(&corr[i][a].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                ranked.truncate(k);
                ranked
            };

            for j in neighbors {
                edges.push((i, j));
                weights.push(corr[i][j] as f32);
            }
        }

        (edges, weights)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
