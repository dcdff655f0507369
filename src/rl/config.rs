//! RL Configuration
//!
//! Configuration structs for graph construction, reward shaping, the agent
//! and the training loop.

use serde::{Deserialize, Serialize};

/// Main RL configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RLConfig {
    /// Correlation graph configuration
    #[serde(default)]
    pub graph: GraphConfig,
    /// Reward shaping configuration
    #[serde(default)]
    pub reward: RewardConfig,
    /// Actor-critic hyperparameters
    #[serde(default)]
    pub agent: AgentConfig,
    /// Training loop configuration
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Correlation graph construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Trailing window (rows of price history) per snapshot
    pub window_size: usize,
    /// Absolute correlation an edge must exceed
    pub correlation_threshold: f64,
    /// Minimum out-degree guaranteed by the k-NN fallback
    pub min_neighbors: usize,
    /// RSI lookback period
    pub rsi_period: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            correlation_threshold: 0.5,
            min_neighbors: 2,
            rsi_period: 14,
        }
    }
}

/// Reward shaping constants
///
/// reward = excess_scale * (r_p - r_b)
///        - volatility_penalty * std(last volatility_window portfolio returns)
///        + consistency_bonus * mean(last consistency_window excess returns), if positive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Starting portfolio and benchmark value
    pub initial_capital: f64,
    /// Multiplier on the single-step excess return
    pub excess_scale: f64,
    /// Multiplier on rolling portfolio volatility
    pub volatility_penalty: f64,
    /// Steps of portfolio returns in the volatility window
    pub volatility_window: usize,
    /// Multiplier on positive mean excess return
    pub consistency_bonus: f64,
    /// Steps of excess returns in the consistency window
    pub consistency_window: usize,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            excess_scale: 100.0,
            volatility_penalty: 10.0,
            volatility_window: 20,
            consistency_bonus: 10.0,
            consistency_window: 5,
        }
    }
}

/// Actor-critic hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate
    pub lr: f64,
    /// Discount factor (gamma)
    pub gamma: f32,
    /// Entropy bonus coefficient
    pub entropy_coef: f32,
    /// Value loss coefficient
    pub value_coef: f32,
    /// Maximum gradient norm for clipping
    pub max_grad_norm: f32,
    /// Hidden dimension of the graph convolutions
    pub hidden_dim: usize,
    /// Dropout between the two graph convolutions
    pub dropout: f64,
    /// Seed for action sampling (None = entropy seeded)
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            gamma: 0.99,
            entropy_coef: 0.01,
            value_coef: 0.5,
            max_grad_norm: 0.5,
            hidden_dim: 64,
            dropout: 0.1,
            seed: None,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Episodes per training job
    pub episodes: usize,
    /// Where parameters are saved and restored
    pub model_path: String,
    /// Save parameters when a job finishes (completed or cancelled)
    pub save_on_completion: bool,
    /// Log every n-th episode at info level
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 50,
            model_path: "./models/agent".to_string(),
            save_on_completion: true,
            log_every: 1,
        }
    }
}

impl RLConfig {
    /// Collect every invalid setting
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.graph.window_size == 0 {
            errors.push("graph.window_size must be positive".to_string());
        }
        if !(self.graph.correlation_threshold > 0.0 && self.graph.correlation_threshold < 1.0) {
            errors.push("graph.correlation_threshold must be in (0, 1)".to_string());
        }
        if self.reward.initial_capital <= 0.0 {
            errors.push("reward.initial_capital must be positive".to_string());
        }
        if self.reward.volatility_window == 0 || self.reward.consistency_window == 0 {
            errors.push("reward windows must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.agent.gamma) {
            errors.push("agent.gamma must be in [0, 1]".to_string());
        }
        if self.agent.lr <= 0.0 {
            errors.push("agent.lr must be positive".to_string());
        }
        if self.agent.max_grad_norm <= 0.0 {
            errors.push("agent.max_grad_norm must be positive".to_string());
        }
        if self.agent.hidden_dim == 0 {
            errors.push("agent.hidden_dim must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.agent.dropout) {
            errors.push("agent.dropout must be in [0, 1)".to_string());
        }

        errors
    }
}
