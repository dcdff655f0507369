//! Neural Network Architectures
//!
//! Graph convolution layers and the actor-critic policy built on them.

pub mod gcn;
pub mod policy;

pub use gcn::{GraphConv, GraphConvConfig};
pub use policy::{snapshot_tensors, GnnPolicy, GnnPolicyConfig, PolicyOutput};
