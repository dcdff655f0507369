//! Price History Providers
//!
//! The core consumes prices through [`PriceHistoryProvider`]. Fetching and
//! caching from a live market-data vendor lives outside this crate; the
//! providers here read local files or serve an in-memory history.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::history::{BenchmarkSeries, PriceHistory};
use crate::error::{GraphfolioError, Result};

/// Source of close-price history and benchmark series
///
/// Implementations must report failures as errors and never substitute
/// synthetic data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Close prices for `assets`, limited to the last `lookback` rows
    async fn fetch_history(&self, assets: &[String], lookback: usize) -> Result<PriceHistory>;

    /// Benchmark closes for `symbol`
    async fn fetch_benchmark(&self, symbol: &str) -> Result<BenchmarkSeries>;
}

/// Reads a wide price CSV and an optional `date,close` benchmark CSV
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    prices_path: PathBuf,
    benchmark_path: Option<PathBuf>,
}

impl CsvPriceProvider {
    pub fn new(prices_path: impl Into<PathBuf>) -> Self {
        Self {
            prices_path: prices_path.into(),
            benchmark_path: None,
        }
    }

    pub fn with_benchmark(mut self, path: impl Into<PathBuf>) -> Self {
        self.benchmark_path = Some(path.into());
        self
    }
}

#[async_trait]
impl PriceHistoryProvider for CsvPriceProvider {
    async fn fetch_history(&self, assets: &[String], lookback: usize) -> Result<PriceHistory> {
        let bytes = tokio::fs::read(&self.prices_path).await.map_err(|e| {
            GraphfolioError::MarketDataUnavailable(format!(
                "cannot read {}: {}",
                self.prices_path.display(),
                e
            ))
        })?;

        let history = PriceHistory::from_csv_reader(bytes.as_slice())?;
        let history = if assets.is_empty() {
            history
        } else {
            history.select(assets)?
        };

        info!(
            "Loaded {} rows for {} assets from {}",
            history.len(),
            history.num_assets(),
            self.prices_path.display()
        );

        Ok(history.tail(lookback))
    }

    async fn fetch_benchmark(&self, symbol: &str) -> Result<BenchmarkSeries> {
        let path = self.benchmark_path.as_ref().ok_or_else(|| {
            GraphfolioError::MarketDataUnavailable(format!("no benchmark file for {}", symbol))
        })?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            GraphfolioError::MarketDataUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;

        let series = BenchmarkSeries::from_csv_reader(symbol, bytes.as_slice())?;
        debug!("Loaded {} benchmark closes for {}", series.len(), symbol);
        Ok(series)
    }
}

/// Serves a fixed history; used by tests and the synthetic CLI mode
#[derive(Debug, Clone)]
pub struct InMemoryPriceProvider {
    history: PriceHistory,
    benchmark: Option<BenchmarkSeries>,
}

impl InMemoryPriceProvider {
    pub fn new(history: PriceHistory) -> Self {
        Self {
            history,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, benchmark: BenchmarkSeries) -> Self {
        self.benchmark = Some(benchmark);
        self
    }
}

#[async_trait]
impl PriceHistoryProvider for InMemoryPriceProvider {
    async fn fetch_history(&self, assets: &[String], lookback: usize) -> Result<PriceHistory> {
        let history = if assets.is_empty() {
            self.history.clone()
        } else {
            self.history.select(assets)?
        };
        Ok(history.tail(lookback))
    }

    async fn fetch_benchmark(&self, symbol: &str) -> Result<BenchmarkSeries> {
        self.benchmark.clone().ok_or_else(|| {
            GraphfolioError::MarketDataUnavailable(format!("no benchmark loaded for {}", symbol))
        })
    }
}
