//! Dirichlet Policy Distribution
//!
//! Portfolio weights are drawn from a Dirichlet whose concentration comes
//! from the actor logits. Log-probability and entropy are built from tensor
//! operations so gradients flow back into the network; sampling happens on
//! the host with `rand_distr`.
//!
//! Log-gamma and digamma use the recurrence `f(x) = f(x + 6) - shift(x)`
//! followed by an asymptotic series, accurate to roughly 1e-7 for x > 0.

use burn::prelude::*;
use burn::tensor::activation::relu;
use rand::Rng;
use rand_distr::Distribution;

use crate::error::{GraphfolioError, Result};

/// Recurrence shift before the asymptotic series is applied
const SHIFT: usize = 6;

/// ln(2 pi) / 2
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;

/// Smallest weight a sampled component may take before renormalization
pub const MIN_WEIGHT: f64 = 1e-6;

/// Numerically stable `ln(1 + e^x)`
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let tail = x.clone().abs().neg().exp().add_scalar(1.0).log();
    relu(x) + tail
}

/// Element-wise log-gamma, valid for positive inputs
pub fn ln_gamma<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let mut shift = x.clone().log();
    for k in 1..SHIFT {
        shift = shift + x.clone().add_scalar(k as f64).log();
    }

    let z = x.add_scalar(SHIFT as f64);
    let inv = z.clone().recip();
    let inv2 = inv.clone() * inv.clone();

    // 1/(12z) - 1/(360z^3) + 1/(1260z^5) - 1/(1680z^7)
    let poly = inv2.clone().mul_scalar(-1.0 / 1680.0).add_scalar(1.0 / 1260.0);
    let poly = (poly * inv2.clone()).add_scalar(-1.0 / 360.0);
    let poly = (poly * inv2).add_scalar(1.0 / 12.0);
    let series = inv * poly;

    let stirling = z.clone().sub_scalar(0.5) * z.clone().log() - z + series;
    stirling.add_scalar(HALF_LN_2PI) - shift
}

/// Element-wise digamma, valid for positive inputs
pub fn digamma<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let mut shift = x.clone().recip();
    for k in 1..SHIFT {
        shift = shift + x.clone().add_scalar(k as f64).recip();
    }

    let z = x.add_scalar(SHIFT as f64);
    let inv = z.clone().recip();
    let inv2 = inv.clone() * inv.clone();

    // -1/(12z^2) + 1/(120z^4) - 1/(252z^6) + 1/(240z^8)
    let poly = inv2.clone().mul_scalar(1.0 / 240.0).add_scalar(-1.0 / 252.0);
    let poly = (poly * inv2.clone()).add_scalar(1.0 / 120.0);
    let poly = (poly * inv2.clone()).add_scalar(-1.0 / 12.0);
    let series = poly * inv2;

    z.log() - inv.mul_scalar(0.5) + series - shift
}

/// Dirichlet distribution over the open simplex
#[derive(Debug, Clone)]
pub struct Dirichlet<B: Backend> {
    concentration: Tensor<B, 1>,
}

impl<B: Backend> Dirichlet<B> {
    pub fn new(concentration: Tensor<B, 1>) -> Self {
        Self { concentration }
    }

    /// Concentration `softplus(logits) + 1`, so every component exceeds 1
    pub fn from_logits(logits: Tensor<B, 1>) -> Self {
        Self::new(softplus(logits).add_scalar(1.0))
    }

    pub fn concentration(&self) -> Tensor<B, 1> {
        self.concentration.clone()
    }

    pub fn dim(&self) -> usize {
        self.concentration.dims()[0]
    }

    /// Closed-form mean `alpha / sum(alpha)`
    pub fn mean(&self) -> Tensor<B, 1> {
        let total = self.concentration.clone().sum();
        self.concentration.clone() / total
    }

    /// Log density at `value`, shape `[1]`
    pub fn log_prob(&self, value: Tensor<B, 1>) -> Tensor<B, 1> {
        let alpha = self.concentration.clone();
        let kernel = (alpha.clone().sub_scalar(1.0) * value.log()).sum();
        let norm = ln_gamma(alpha.clone().sum()) - ln_gamma(alpha).sum();
        kernel + norm
    }

    /// Differential entropy, shape `[1]`
    pub fn entropy(&self) -> Tensor<B, 1> {
        let alpha = self.concentration.clone();
        let k = self.dim() as f64;
        let total = alpha.clone().sum();

        let log_beta = ln_gamma(alpha.clone()).sum() - ln_gamma(total.clone());
        let total_term = total.clone().sub_scalar(k) * digamma(total);
        let component_term = (alpha.clone().sub_scalar(1.0) * digamma(alpha)).sum();

        log_beta + total_term - component_term
    }

    /// Host copy of the concentration parameters
    pub fn concentration_values(&self) -> Result<Vec<f64>> {
        let values = self
            .concentration
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GraphfolioError::Model(format!("cannot read concentration: {:?}", e)))?;
        Ok(values.into_iter().map(f64::from).collect())
    }

    /// Draw one weight vector
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>> {
        sample_simplex(&self.concentration_values()?, rng)
    }
}

/// Sample the simplex for concentration `alpha`
///
/// Components are clamped to [`MIN_WEIGHT`] and renormalized so the draw
/// stays strictly inside the simplex and its log-density is finite.
pub fn sample_simplex<R: Rng + ?Sized>(alpha: &[f64], rng: &mut R) -> Result<Vec<f32>> {
    if alpha.iter().any(|a| !a.is_finite() || *a <= 0.0) {
        return Err(GraphfolioError::Model(format!(
            "invalid Dirichlet concentration: {:?}",
            alpha
        )));
    }

    let raw = match alpha.len() {
        0 => return Err(GraphfolioError::EmptyUniverse),
        1 => vec![1.0],
        _ => rand_distr::Dirichlet::new(alpha)
            .map_err(|e| GraphfolioError::Model(format!("Dirichlet: {}", e)))?
            .sample(rng),
    };

    Ok(renormalize(&raw))
}

fn renormalize(raw: &[f64]) -> Vec<f32> {
    let clamped: Vec<f64> = raw
        .iter()
        .map(|w| if w.is_finite() { w.max(MIN_WEIGHT) } else { MIN_WEIGHT })
        .collect();
    let total: f64 = clamped.iter().sum();
    clamped.iter().map(|w| (w / total) as f32).collect()
}
