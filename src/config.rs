use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rl::config::{AgentConfig, GraphConfig, RLConfig, RewardConfig, TrainingConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub reward: RewardConfig,
    pub agent: AgentConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

/// Asset universe and price sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Universe used until another one is configured
    pub tickers: Vec<String>,
    /// Benchmark symbol the excess return is measured against
    pub benchmark_symbol: String,
    /// Wide close-price CSV (`date,<ticker>,...`)
    pub prices_path: Option<String>,
    /// Benchmark CSV (`date,close`)
    pub benchmark_path: Option<String>,
    /// Rows fetched for inference (about six months)
    pub inference_lookback: usize,
    /// Rows fetched for a training job (about one year)
    pub training_lookback: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            tickers: ["AAPL", "NVDA", "MSFT", "GOOG", "AMZN", "TSLA", "META", "AMD", "QCOM", "INTC"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            benchmark_symbol: "SPY".to_string(),
            prices_path: None,
            benchmark_path: None,
            inference_lookback: 126,
            training_lookback: 252,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GRAPHFOLIO_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GRAPHFOLIO__AGENT__LR, etc.)
            .add_source(
                Environment::with_prefix("GRAPHFOLIO")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("data.tickers")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load a single file, ignoring the config directory layout
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Learning-side sections as one value
    pub fn rl(&self) -> RLConfig {
        RLConfig {
            graph: self.graph.clone(),
            reward: self.reward.clone(),
            agent: self.agent.clone(),
            training: self.training.clone(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.rl().validate();

        if self.data.tickers.is_empty() {
            errors.push("data.tickers must not be empty".to_string());
        }

        if self.data.inference_lookback < self.graph.window_size {
            errors.push(format!(
                "data.inference_lookback ({}) is shorter than graph.window_size ({})",
                self.data.inference_lookback, self.graph.window_size
            ));
        }

        // reset() needs W rows plus one step to take
        if self.data.training_lookback < self.graph.window_size + 2 {
            errors.push(format!(
                "data.training_lookback must be at least graph.window_size + 2 ({})",
                self.graph.window_size + 2
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
