//! Graph Snapshot
//!
//! The observation handed to the policy at every environment step: one
//! feature row per asset plus a directed, optionally weighted edge list.

use serde::{Deserialize, Serialize};

/// Features per node: last return, volatility, momentum, normalized RSI
pub const NODE_FEATURES: usize = 4;

/// Per-step observation of the asset graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// One row per asset, in universe order
    pub node_features: Vec<[f32; NODE_FEATURES]>,
    /// Directed `(source, target)` pairs
    pub edges: Vec<(usize, usize)>,
    /// Signed correlation per edge; absent means every edge weighs 1.0
    #[serde(default)]
    pub edge_weights: Option<Vec<f32>>,
}

impl GraphSnapshot {
    /// All-zero features and no edges ("insufficient data")
    pub fn empty(num_nodes: usize) -> Self {
        Self {
            node_features: vec![[0.0; NODE_FEATURES]; num_nodes],
            edges: Vec::new(),
            edge_weights: Some(Vec::new()),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.node_features.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// True for the zero snapshot produced on insufficient history
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
            && self
                .node_features
                .iter()
                .all(|row| row.iter().all(|v| *v == 0.0))
    }

    /// Weight of edge `idx`, 1.0 when weights are absent
    pub fn edge_weight(&self, idx: usize) -> f32 {
        self.edge_weights
            .as_ref()
            .and_then(|w| w.get(idx).copied())
            .unwrap_or(1.0)
    }

    /// Number of edges leaving `node`
    pub fn out_degree(&self, node: usize) -> usize {
        self.edges.iter().filter(|(src, _)| *src == node).count()
    }

    /// Row-major `[num_nodes * NODE_FEATURES]` feature buffer
    pub fn flat_features(&self) -> Vec<f32> {
        self.node_features.iter().flatten().copied().collect()
    }

    /// Row-major `[n * n]` propagation matrix `D^-1/2 (A + I) D^-1/2`
    ///
    /// Entry `[dst * n + src]` carries the message from `src` to `dst`.
    /// Edges contribute `|weight|`, self-loops contribute 1, and degrees are
    /// taken over incoming weight (including the self-loop), so every
    /// degree is at least 1.
    pub fn normalized_adjacency(&self) -> Vec<f32> {
        let n = self.num_nodes();
        let mut adj = vec![0.0f32; n * n];

        for i in 0..n {
            adj[i * n + i] = 1.0;
        }
        for (idx, &(src, dst)) in self.edges.iter().enumerate() {
            if src < n && dst < n && src != dst {
                let w = self.edge_weight(idx).abs();
                if w.is_finite() {
                    adj[dst * n + src] += w;
                }
            }
        }

        let deg_inv_sqrt: Vec<f32> = (0..n)
            .map(|dst| {
                let deg: f32 = adj[dst * n..(dst + 1) * n].iter().sum();
                if deg > 0.0 {
                    deg.powf(-0.5)
                } else {
                    0.0
                }
            })
            .collect();

        for dst in 0..n {
            for src in 0..n {
                adj[dst * n + src] *= deg_inv_sqrt[src] * deg_inv_sqrt[dst];
            }
        }

        adj
    }
}
