//! Portfolio Allocation Environment
//!
//! Gym-like reset/step over historical close prices. Each step applies a
//! weight vector for one period and rewards excess return over a benchmark.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::data::{BenchmarkSeries, PriceHistory};
use crate::error::{GraphfolioError, Result};
use crate::rl::config::{GraphConfig, RewardConfig};
use crate::rl::core::{
    ExcessReturnReward, GraphSnapshot, RewardFunction, RewardSignal, RewardTransition,
};
use crate::rl::graph::GraphBuilder;

/// Portfolio bookkeeping mutated only by [`PortfolioEnvironment::step`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Weights applied on the last step (uniform after reset)
    pub weights: Vec<f64>,
    pub portfolio_value: f64,
    pub benchmark_value: f64,
    pub portfolio_returns: Vec<f64>,
    pub benchmark_returns: Vec<f64>,
}

impl PortfolioState {
    fn new(num_assets: usize, capital: f64) -> Self {
        Self {
            weights: uniform_weights(num_assets),
            portfolio_value: capital,
            benchmark_value: capital,
            portfolio_returns: Vec::new(),
            benchmark_returns: Vec::new(),
        }
    }

    pub fn steps(&self) -> usize {
        self.portfolio_returns.len()
    }

    pub fn excess_returns(&self) -> Vec<f64> {
        self.portfolio_returns
            .iter()
            .zip(&self.benchmark_returns)
            .map(|(p, b)| p - b)
            .collect()
    }
}

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Graph at the new time pointer
    pub snapshot: GraphSnapshot,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Date the period ended on
    pub date: Option<NaiveDate>,
    pub portfolio_value: f64,
    pub benchmark_value: f64,
    /// Normalized weights actually applied
    pub weights: Vec<f64>,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub excess_return: f64,
    pub reward: RewardSignal,
}

/// Allocation environment over a fixed universe
pub struct PortfolioEnvironment {
    history: PriceHistory,
    benchmark: Option<BenchmarkSeries>,
    builder: GraphBuilder,
    reward_fn: Box<dyn RewardFunction>,
    initial_capital: f64,
    current_step: usize,
    done: bool,
    state: PortfolioState,
}

impl PortfolioEnvironment {
    /// Create an environment; history must cover at least one step past the
    /// first observation window
    pub fn new(
        history: PriceHistory,
        benchmark: Option<BenchmarkSeries>,
        graph: GraphConfig,
        reward: RewardConfig,
    ) -> Result<Self> {
        if history.num_assets() == 0 {
            return Err(GraphfolioError::EmptyUniverse);
        }
        let window = graph.window_size;
        if window == 0 {
            return Err(GraphfolioError::InvalidConfig(
                "graph.window_size must be positive".to_string(),
            ));
        }
        let required = window + 2;
        if history.len() < required {
            return Err(GraphfolioError::InsufficientHistory {
                required,
                available: history.len(),
            });
        }

        let initial_capital = reward.initial_capital;
        let num_assets = history.num_assets();

        Ok(Self {
            history,
            benchmark,
            builder: GraphBuilder::new(graph),
            reward_fn: Box::new(ExcessReturnReward::new(reward)),
            initial_capital,
            current_step: window,
            done: false,
            state: PortfolioState::new(num_assets, initial_capital),
        })
    }

    /// Replace the reward function
    pub fn with_reward_function(mut self, reward_fn: Box<dyn RewardFunction>) -> Self {
        self.reward_fn = reward_fn;
        self
    }

    pub fn num_assets(&self) -> usize {
        self.history.num_assets()
    }

    pub fn assets(&self) -> &[String] {
        self.history.assets()
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn benchmark(&self) -> Option<&BenchmarkSeries> {
        self.benchmark.as_ref()
    }

    pub fn window_size(&self) -> usize {
        self.builder.config().window_size
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    /// Steps in a full episode
    pub fn episode_length(&self) -> usize {
        self.history.len() - 1 - self.window_size()
    }

    /// Reset the environment for a new episode
    pub fn reset(&mut self) -> GraphSnapshot {
        self.current_step = self.window_size();
        self.done = false;
        self.state = PortfolioState::new(self.num_assets(), self.initial_capital);

        debug!(
            assets = self.num_assets(),
            steps = self.episode_length(),
            "environment reset"
        );
        self.observation()
    }

    /// Graph over prices `[t - W, t)`
    pub fn observation(&self) -> GraphSnapshot {
        let window = self.window_size();
        let start = self.current_step.saturating_sub(window);
        self.builder
            .build_graph(&self.history.window(start, self.current_step), window)
    }

    /// Apply `action` for one period and advance time
    pub fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        if self.done {
            return Err(GraphfolioError::EpisodeFinished);
        }
        let n = self.num_assets();
        if action.len() != n {
            return Err(GraphfolioError::ActionDimension {
                expected: n,
                actual: action.len(),
            });
        }

        let weights = normalize_weights(action);
        let t = self.current_step;

        let asset_returns: Vec<f64> = (0..n)
            .map(|i| {
                let series = self.history.series(i);
                period_return(series[t], series[t + 1])
            })
            .collect();

        let portfolio_return: f64 = weights
            .iter()
            .zip(&asset_returns)
            .map(|(w, r)| w * r)
            .sum();
        let benchmark_return = self.benchmark_return(t);

        self.state.weights = weights.clone();
        self.state.portfolio_value *= 1.0 + portfolio_return;
        self.state.benchmark_value *= 1.0 + benchmark_return;
        self.state.portfolio_returns.push(portfolio_return);
        self.state.benchmark_returns.push(benchmark_return);

        let signal = self.reward_fn.compute(&RewardTransition {
            portfolio_return,
            benchmark_return,
            portfolio_history: &self.state.portfolio_returns,
            benchmark_history: &self.state.benchmark_returns,
        });

        self.current_step += 1;
        self.done = self.current_step >= self.history.len() - 1;

        trace!(
            step = t,
            portfolio_return,
            benchmark_return,
            reward = signal.total,
            done = self.done,
            "environment step"
        );

        Ok(StepResult {
            snapshot: self.observation(),
            reward: signal.total,
            done: self.done,
            info: StepInfo {
                date: self.history.dates().get(t + 1).copied(),
                portfolio_value: self.state.portfolio_value,
                benchmark_value: self.state.benchmark_value,
                weights,
                portfolio_return,
                benchmark_return,
                excess_return: portfolio_return - benchmark_return,
                reward: signal,
            },
        })
    }

    /// Benchmark return between the dates of rows `t` and `t + 1`, else 0
    fn benchmark_return(&self, t: usize) -> f64 {
        let dates = self.history.dates();
        match (&self.benchmark, dates.get(t), dates.get(t + 1)) {
            (Some(benchmark), Some(from), Some(to)) => {
                benchmark.return_between(from, to).unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }
}

/// Long-only normalization: negatives and non-finite entries count as 0,
/// and an all-zero action becomes uniform
pub fn normalize_weights(action: &[f32]) -> Vec<f64> {
    let clipped: Vec<f64> = action
        .iter()
        .map(|&w| {
            let w = f64::from(w);
            if w.is_finite() && w > 0.0 {
                w
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = clipped.iter().sum();

    if total > 0.0 && total.is_finite() {
        clipped.into_iter().map(|w| w / total).collect()
    } else {
        uniform_weights(action.len())
    }
}

fn uniform_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn period_return(from: f64, to: f64) -> f64 {
    let ret = (to - from) / from;
    if ret.is_finite() {
        ret
    } else {
        0.0
    }
}
