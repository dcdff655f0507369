//! Global gradient-norm clipping
//!
//! Burn's optimizer-level clipping bounds each parameter tensor on its own.
//! These helpers bound the L2 norm of all gradients taken together, scaling
//! every gradient by the same factor before they are handed to the optimizer.

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        if let Some(grad) = tensor.grad(self.grads) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads: &'a mut B::Gradients,
    scale: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        if let Some(grad) = tensor.grad(self.grads) {
            tensor.grad_replace(self.grads, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm over the gradients of every float parameter in `module`
pub fn global_grad_norm<B, M>(module: &M, grads: &B::Gradients) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, total: 0.0 };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Scale all gradients so their combined norm is at most `max_norm`
///
/// Returns the norm before clipping. A non-finite norm leaves the gradients
/// untouched.
pub fn clip_grad_norm<B, M>(module: &M, grads: &mut B::Gradients, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: Module<B>,
{
    let total = global_grad_norm::<B, M>(module, grads);
    if total.is_finite() && total > max_norm {
        let mut visitor = Rescale::<B> {
            grads,
            scale: max_norm / (total + 1e-6),
        };
        module.visit(&mut visitor);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::core::GraphSnapshot;
    use crate::rl::networks::{GnnPolicy, GnnPolicyConfig};
    use crate::rl::TrainBackend;

    fn snapshot() -> GraphSnapshot {
        GraphSnapshot {
            node_features: vec![[0.5, 0.2, -0.3, 0.7], [-0.4, 0.1, 0.6, 0.2], [0.9, 0.3, 0.1, 0.4]],
            edges: vec![(0, 1), (1, 0), (1, 2), (2, 1)],
            edge_weights: Some(vec![0.8, 0.8, -0.6, -0.6]),
        }
    }

    fn gradients(scale: f32) -> (GnnPolicy<TrainBackend>, <TrainBackend as AutodiffBackend>::Gradients) {
        let device = Default::default();
        TrainBackend::seed(7);
        let model: GnnPolicy<TrainBackend> = GnnPolicyConfig::new()
            .with_hidden_dim(16)
            .with_dropout(0.0)
            .init(&device);
        let output = model.forward_snapshot(&snapshot(), &device);
        let loss = (output.logits.sum() + output.value.sum()).mul_scalar(scale);
        let grads = loss.backward();
        (model, grads)
    }

    #[test]
    fn test_combined_norm_bounded_after_clip() {
        let (model, mut grads) = gradients(1000.0);

        let before = clip_grad_norm::<TrainBackend, _>(&model, &mut grads, 0.5);
        assert!(before > 0.5);

        let after = global_grad_norm::<TrainBackend, _>(&model, &grads);
        assert!(after <= 0.5 + 1e-4, "combined norm {} above limit", after);
        assert!(after > 0.45);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let (model, mut grads) = gradients(1e-4);

        let before = global_grad_norm::<TrainBackend, _>(&model, &grads);
        assert!(before < 0.5);

        let reported = clip_grad_norm::<TrainBackend, _>(&model, &mut grads, 0.5);
        let after = global_grad_norm::<TrainBackend, _>(&model, &grads);
        assert!((reported - before).abs() < 1e-12);
        assert!((after - before).abs() < 1e-9);
    }
}
