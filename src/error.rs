use thiserror::Error;

/// Main error type for the allocator
#[derive(Error, Debug)]
pub enum GraphfolioError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Asset universe is empty")]
    EmptyUniverse,

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    #[error("Insufficient history: need {required} rows, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    // Environment errors
    #[error("Action length mismatch: expected {expected} weights, got {actual}")]
    ActionDimension { expected: usize, actual: usize },

    #[error("Episode already finished; call reset() first")]
    EpisodeFinished,

    // Training errors
    #[error("A training job is already running (episode {episode}/{total})")]
    TrainingInProgress { episode: usize, total: usize },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] burn::record::RecorderError),

    // Serialization errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for GraphfolioError
pub type Result<T> = std::result::Result<T, GraphfolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_dimension_message() {
        let err = GraphfolioError::ActionDimension {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Action length mismatch: expected 3 weights, got 2"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GraphfolioError = io.into();
        assert!(matches!(err, GraphfolioError::Io(_)));
    }
}
