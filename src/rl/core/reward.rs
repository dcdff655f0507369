//! Reward Functions
//!
//! Shaped excess-return reward for the allocation environment.

use serde::{Deserialize, Serialize};

use crate::rl::graph::features::{mean, population_std};

// Re-export config
pub use crate::rl::config::RewardConfig;

/// Reward signal components
///
/// Kept separately so the environment can report which term drove a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    /// Scaled single-step excess return
    pub excess_reward: f64,
    /// Rolling volatility penalty (subtracted)
    pub volatility_penalty: f64,
    /// Positive mean-excess bonus (added)
    pub consistency_bonus: f64,
    /// excess_reward - volatility_penalty + consistency_bonus
    pub total: f64,
}

impl RewardSignal {
    pub fn zero() -> Self {
        Self::default()
    }

    fn finish(mut self) -> Self {
        self.total = self.excess_reward - self.volatility_penalty + self.consistency_bonus;
        self
    }
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward from a state transition
    fn compute(&self, transition: &RewardTransition<'_>) -> RewardSignal;
}

/// Information needed to compute rewards
///
/// Histories include the step being rewarded as their last element.
#[derive(Debug, Clone, Copy)]
pub struct RewardTransition<'a> {
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub portfolio_history: &'a [f64],
    pub benchmark_history: &'a [f64],
}

impl RewardTransition<'_> {
    pub fn excess_return(&self) -> f64 {
        self.portfolio_return - self.benchmark_return
    }
}

/// Excess return over the benchmark, penalized by rolling volatility and
/// boosted by a run of outperformance
#[derive(Debug, Clone, Default)]
pub struct ExcessReturnReward {
    config: RewardConfig,
}

impl ExcessReturnReward {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }
}

impl RewardFunction for ExcessReturnReward {
    fn compute(&self, transition: &RewardTransition<'_>) -> RewardSignal {
        let cfg = &self.config;
        let mut signal = RewardSignal {
            excess_reward: cfg.excess_scale * transition.excess_return(),
            ..Default::default()
        };

        let portfolio = transition.portfolio_history;
        if portfolio.len() >= cfg.volatility_window {
            let recent = &portfolio[portfolio.len() - cfg.volatility_window..];
            signal.volatility_penalty = cfg.volatility_penalty * population_std(recent);
        }

        let benchmark = transition.benchmark_history;
        let window = cfg.consistency_window;
        if portfolio.len() >= window && benchmark.len() >= window {
            let recent_excess = mean(&portfolio[portfolio.len() - window..])
                - mean(&benchmark[benchmark.len() - window..]);
            if recent_excess > 0.0 {
                signal.consistency_bonus = cfg.consistency_bonus * recent_excess;
            }
        }

        signal.finish()
    }
}
