//! Portfolio performance metrics
//!
//! Annualized Sharpe ratio, maximum drawdown and alpha/beta against a
//! benchmark, computed from daily return and value series.

use serde::{Deserialize, Serialize};

use crate::rl::graph::features::{mean, population_std};
use crate::rl::training::EvaluationRun;

/// Trading days per year
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Annual risk-free rate used by [`sharpe_ratio`]
pub const RISK_FREE_RATE: f64 = 0.04;

/// Annualized Sharpe ratio of daily returns
///
/// `mean(r - rf / periods) / std(r) * sqrt(periods)` with the population
/// standard deviation. Zero below two returns or when the std is zero.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let std_dev = population_std(returns);
    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }

    let daily_rf = risk_free_rate / periods;
    let excess_mean = mean(returns) - daily_rf;
    excess_mean / std_dev * periods.sqrt()
}

/// Largest peak-to-trough decline of a value series, as a fraction of the peak
pub fn max_drawdown(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mut peak = values[0];
    let mut max_dd = 0.0f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Regression of asset returns on benchmark returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaBeta {
    /// Intercept compounded over a year: `(1 + c)^252 - 1`
    pub alpha: f64,
    pub beta: f64,
}

/// OLS fit `asset = beta * benchmark + c`
///
/// Both are zero when the series differ in length, hold fewer than two
/// points, or the benchmark has no variance.
pub fn alpha_beta(asset_returns: &[f64], benchmark_returns: &[f64]) -> AlphaBeta {
    let n = asset_returns.len();
    if n != benchmark_returns.len() || n < 2 {
        return AlphaBeta::default();
    }

    let mean_a = mean(asset_returns);
    let mean_b = mean(benchmark_returns);
    let (cov, var_b) = asset_returns
        .iter()
        .zip(benchmark_returns)
        .fold((0.0, 0.0), |(cov, var), (a, b)| {
            (cov + (a - mean_a) * (b - mean_b), var + (b - mean_b).powi(2))
        });

    if var_b == 0.0 {
        return AlphaBeta::default();
    }

    let beta = cov / var_b;
    let intercept = mean_a - beta * mean_b;
    AlphaBeta {
        alpha: (1.0 + intercept).powf(PERIODS_PER_YEAR) - 1.0,
        beta,
    }
}

/// Headline numbers for an evaluation rollout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub steps: usize,
    pub total_return: f64,
    pub benchmark_return: f64,
    pub sharpe_ratio: f64,
    pub benchmark_sharpe: f64,
    pub max_drawdown: f64,
    pub alpha: f64,
    pub beta: f64,
    pub total_reward: f64,
}

impl PerformanceSummary {
    pub fn from_run(run: &EvaluationRun) -> Self {
        let AlphaBeta { alpha, beta } = alpha_beta(&run.portfolio_returns, &run.benchmark_returns);

        Self {
            steps: run.steps(),
            total_return: total_return(&run.portfolio_values),
            benchmark_return: total_return(&run.benchmark_values),
            sharpe_ratio: sharpe_ratio(&run.portfolio_returns, RISK_FREE_RATE, PERIODS_PER_YEAR),
            benchmark_sharpe: sharpe_ratio(&run.benchmark_returns, RISK_FREE_RATE, PERIODS_PER_YEAR),
            max_drawdown: max_drawdown(&run.portfolio_values),
            alpha,
            beta,
            total_reward: run.total_reward,
        }
    }
}

fn total_return(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if *first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}
