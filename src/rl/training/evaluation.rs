//! Evaluation-mode Policy
//!
//! A frozen copy of the policy on a non-autodiff backend. Dropout is
//! inactive there and actions are the Dirichlet mean, so the same snapshot
//! always yields the same weights.

use burn::prelude::*;
use burn::tensor::ElementConversion;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphfolioError, Result};
use crate::rl::core::{Dirichlet, GraphSnapshot};
use crate::rl::environment::PortfolioEnvironment;
use crate::rl::networks::GnnPolicy;

/// Action with its diagnostics, detached from any graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSample {
    /// Portfolio weights on the open simplex
    pub weights: Vec<f32>,
    pub log_prob: f32,
    pub value: f32,
    pub entropy: f32,
}

/// How weights are drawn from the policy distribution
pub(crate) enum ActionMode<'a> {
    Sample(&'a mut StdRng),
    Mean,
}

/// Policy outputs for one snapshot, still on the backend
pub(crate) struct PolicyStep<B: Backend> {
    pub weights: Vec<f32>,
    pub log_prob: Tensor<B, 1>,
    pub value: Tensor<B, 1>,
    pub entropy: Tensor<B, 1>,
}

impl<B: Backend> PolicyStep<B> {
    pub fn to_sample(&self) -> ActionSample {
        ActionSample {
            weights: self.weights.clone(),
            log_prob: self.log_prob.clone().into_scalar().elem::<f32>(),
            value: self.value.clone().into_scalar().elem::<f32>(),
            entropy: self.entropy.clone().into_scalar().elem::<f32>(),
        }
    }
}

/// Forward the policy, pick weights, and score them under the distribution
pub(crate) fn policy_step<B: Backend>(
    model: &GnnPolicy<B>,
    snapshot: &GraphSnapshot,
    device: &B::Device,
    mode: ActionMode<'_>,
) -> Result<PolicyStep<B>> {
    if snapshot.num_nodes() == 0 {
        return Err(GraphfolioError::EmptyUniverse);
    }

    let output = model.forward_snapshot(snapshot, device);
    let dist = Dirichlet::from_logits(output.logits);

    let weights = match mode {
        ActionMode::Sample(rng) => dist.sample(rng)?,
        ActionMode::Mean => dist
            .mean()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GraphfolioError::Model(format!("cannot read weights: {:?}", e)))?,
    };

    let n = weights.len();
    let action = Tensor::from_data(TensorData::new(weights.clone(), [n]), device);

    Ok(PolicyStep {
        log_prob: dist.log_prob(action),
        value: output.value,
        entropy: dist.entropy(),
        weights,
    })
}

/// Equity curves and allocations from a deterministic rollout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub dates: Vec<NaiveDate>,
    pub portfolio_values: Vec<f64>,
    pub benchmark_values: Vec<f64>,
    pub portfolio_returns: Vec<f64>,
    pub benchmark_returns: Vec<f64>,
    pub weights: Vec<Vec<f64>>,
    pub total_reward: f64,
}

impl EvaluationRun {
    pub fn steps(&self) -> usize {
        self.portfolio_returns.len()
    }
}

/// Frozen policy used for inference and evaluation
#[derive(Debug, Clone)]
pub struct InferencePolicy<B: Backend> {
    model: GnnPolicy<B>,
    device: B::Device,
}

impl<B: Backend> InferencePolicy<B> {
    pub fn new(model: GnnPolicy<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn model(&self) -> &GnnPolicy<B> {
        &self.model
    }

    /// Mean allocation for `snapshot`
    pub fn allocate(&self, snapshot: &GraphSnapshot) -> Result<ActionSample> {
        Ok(policy_step(&self.model, snapshot, &self.device, ActionMode::Mean)?.to_sample())
    }

    /// Roll through a full episode without learning
    pub fn evaluate(&self, env: &mut PortfolioEnvironment) -> Result<EvaluationRun> {
        let mut snapshot = env.reset();
        let capital = env.state().portfolio_value;
        let mut run = EvaluationRun {
            portfolio_values: vec![capital],
            benchmark_values: vec![capital],
            ..Default::default()
        };
        if let Some(date) = env.history().dates().get(env.current_step()) {
            run.dates.push(*date);
        }

        loop {
            let action = self.allocate(&snapshot)?;
            let result = env.step(&action.weights)?;

            run.dates.extend(result.info.date);
            run.portfolio_values.push(result.info.portfolio_value);
            run.benchmark_values.push(result.info.benchmark_value);
            run.portfolio_returns.push(result.info.portfolio_return);
            run.benchmark_returns.push(result.info.benchmark_return);
            run.weights.push(result.info.weights);
            run.total_reward += result.reward;

            snapshot = result.snapshot;
            if result.done {
                break;
            }
        }

        debug!(
            steps = run.steps(),
            total_reward = run.total_reward,
            "evaluation rollout complete"
        );
        Ok(run)
    }
}
