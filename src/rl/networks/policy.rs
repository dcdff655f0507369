//! Graph Actor-Critic Policy
//!
//! Two graph convolutions shared by a per-node actor head (one logit per
//! asset) and a mean-pooled critic head (one state value).

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;

use super::gcn::{GraphConv, GraphConvConfig};
use crate::rl::core::{GraphSnapshot, NODE_FEATURES};

/// Policy network configuration
#[derive(Config, Debug)]
pub struct GnnPolicyConfig {
    /// Features per node
    #[config(default = "NODE_FEATURES")]
    pub input_dim: usize,
    /// Width of both graph convolutions
    #[config(default = "64")]
    pub hidden_dim: usize,
    /// Dropout between the convolutions (training backend only)
    #[config(default = "0.1")]
    pub dropout: f64,
}

/// Forward pass output for one snapshot
#[derive(Debug, Clone)]
pub struct PolicyOutput<B: Backend> {
    /// One logit per asset, `[n]`
    pub logits: Tensor<B, 1>,
    /// State value, `[1]`
    pub value: Tensor<B, 1>,
}

/// Graph convolution actor-critic
#[derive(Module, Debug)]
pub struct GnnPolicy<B: Backend> {
    conv1: GraphConv<B>,
    conv2: GraphConv<B>,
    dropout: Dropout,
    actor_head: Linear<B>,
    critic_head: Linear<B>,
    activation: Relu,
}

impl GnnPolicyConfig {
    /// Initialize the policy network
    pub fn init<B: Backend>(&self, device: &B::Device) -> GnnPolicy<B> {
        GnnPolicy {
            conv1: GraphConvConfig::new(self.input_dim, self.hidden_dim).init(device),
            conv2: GraphConvConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            actor_head: LinearConfig::new(self.hidden_dim, 1).init(device),
            critic_head: LinearConfig::new(self.hidden_dim, 1).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> GnnPolicy<B> {
    /// `features` is `[n, input_dim]`, `adjacency` the normalized `[n, n]`
    /// propagation matrix
    pub fn forward(&self, features: Tensor<B, 2>, adjacency: Tensor<B, 2>) -> PolicyOutput<B> {
        let [num_nodes, _] = features.dims();

        let h = self.conv1.forward(features, adjacency.clone());
        let h = self.activation.forward(h);
        let h = self.dropout.forward(h);
        let h = self.conv2.forward(h, adjacency);
        let h = self.activation.forward(h);

        let logits = self.actor_head.forward(h.clone()).reshape([num_nodes]);

        let pooled = h.mean_dim(0);
        let value = self.critic_head.forward(pooled).reshape([1]);

        PolicyOutput { logits, value }
    }

    /// Forward pass straight from a snapshot
    pub fn forward_snapshot(&self, snapshot: &GraphSnapshot, device: &B::Device) -> PolicyOutput<B> {
        let (features, adjacency) = snapshot_tensors(snapshot, device);
        self.forward(features, adjacency)
    }
}

/// Feature matrix `[n, NODE_FEATURES]` and normalized adjacency `[n, n]`
pub fn snapshot_tensors<B: Backend>(
    snapshot: &GraphSnapshot,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let n = snapshot.num_nodes();
    let features = Tensor::from_data(
        TensorData::new(snapshot.flat_features(), [n, NODE_FEATURES]),
        device,
    );
    let adjacency = Tensor::from_data(
        TensorData::new(snapshot.normalized_adjacency(), [n, n]),
        device,
    );
    (features, adjacency)
}
