//! Graph Convolution Layer
//!
//! Implements `H' = A_hat H W + b` where `A_hat` is the normalized
//! adjacency `D^-1/2 (A + I) D^-1/2` built by
//! [`GraphSnapshot::normalized_adjacency`](crate::rl::core::GraphSnapshot::normalized_adjacency).

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

/// Graph convolution configuration
#[derive(Config, Debug)]
pub struct GraphConvConfig {
    /// Input features per node
    pub input_dim: usize,
    /// Output features per node
    pub output_dim: usize,
}

/// Dense graph convolution over a `[n, n]` propagation matrix
#[derive(Module, Debug)]
pub struct GraphConv<B: Backend> {
    linear: Linear<B>,
    bias: Param<Tensor<B, 1>>,
}

impl GraphConvConfig {
    /// Initialize the layer; bias starts at zero
    pub fn init<B: Backend>(&self, device: &B::Device) -> GraphConv<B> {
        let linear = LinearConfig::new(self.input_dim, self.output_dim)
            .with_bias(false)
            .init(device);
        let bias = Param::from_tensor(Tensor::zeros([self.output_dim], device));

        GraphConv { linear, bias }
    }
}

impl<B: Backend> GraphConv<B> {
    /// `x` is `[n, input_dim]`, `adjacency` is `[n, n]`
    pub fn forward(&self, x: Tensor<B, 2>, adjacency: Tensor<B, 2>) -> Tensor<B, 2> {
        let transformed = self.linear.forward(x);
        let aggregated = adjacency.matmul(transformed);
        aggregated + self.bias.val().unsqueeze::<2>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn identity(n: usize) -> Tensor<TestBackend, 2> {
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Tensor::from_data(TensorData::new(data, [n, n]), &Default::default())
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let layer = GraphConvConfig::new(4, 8).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 2>::ones([5, 4], &device);
        let adjacency = identity(5);
        let out = layer.forward(x, adjacency);

        assert_eq!(out.dims(), [5, 8]);
    }

    #[test]
    fn test_isolated_nodes_do_not_mix() {
        let device = Default::default();
        let layer = GraphConvConfig::new(2, 3).init::<TestBackend>(&device);

        // identity propagation: each node sees only itself
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0], [2, 2]),
            &device,
        );
        let adjacency = identity(2);
        let out = layer.forward(x.clone(), adjacency);
        let direct = layer.linear.forward(x);

        let diff: f32 = (out - direct).abs().sum().into_scalar();
        assert!(diff < 1e-6);
    }
}
