//! Synthetic price generation for demos and tests.
//!
//! Only used when explicitly requested (`--synthetic`); providers never fall
//! back to it.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::history::{BenchmarkSeries, PriceHistory};
use crate::error::{GraphfolioError, Result};

/// Parameters of the one-factor random walk
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub assets: Vec<String>,
    pub days: usize,
    pub start: NaiveDate,
    pub start_price: f64,
    /// Daily drift of the common factor
    pub market_drift: f64,
    /// Daily volatility of the common factor
    pub market_vol: f64,
    /// Daily idiosyncratic volatility per asset
    pub idio_vol: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            assets: vec!["AAA".into(), "BBB".into(), "CCC".into()],
            days: 120,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            start_price: 100.0,
            market_drift: 0.0003,
            market_vol: 0.01,
            idio_vol: 0.012,
            seed: 7,
        }
    }
}

fn dates(start: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (0..days).map(|i| start + Duration::days(i as i64)).collect()
}

fn normal(std: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std).map_err(|e| GraphfolioError::InvalidConfig(format!("volatility: {}", e)))
}

/// Correlated geometric random walks: every asset loads on a shared factor
/// with a per-asset beta in [0.5, 1.5].
pub fn generate_price_history(config: &SyntheticConfig) -> Result<PriceHistory> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let market = normal(config.market_vol)?;
    let idio = normal(config.idio_vol)?;

    let n = config.assets.len();
    let betas: Vec<f64> = (0..n)
        .map(|i| 0.5 + i as f64 / n.max(1) as f64)
        .collect();

    let mut closes = vec![Vec::with_capacity(config.days); n];
    let mut prices = vec![config.start_price; n];

    for day in 0..config.days {
        if day > 0 {
            let factor = config.market_drift + market.sample(&mut rng);
            for (i, price) in prices.iter_mut().enumerate() {
                let ret = betas[i] * factor + idio.sample(&mut rng);
                *price *= (1.0 + ret).max(0.01);
            }
        }
        for (series, price) in closes.iter_mut().zip(&prices) {
            series.push(*price);
        }
    }

    PriceHistory::new(config.assets.clone(), dates(config.start, config.days), closes)
}

/// Market-like benchmark walk over the same dates as
/// [`generate_price_history`], without idiosyncratic noise
pub fn generate_benchmark(config: &SyntheticConfig, symbol: &str) -> Result<BenchmarkSeries> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let market = normal(config.market_vol)?;

    let mut price = config.start_price;
    let pairs = dates(config.start, config.days)
        .into_iter()
        .enumerate()
        .map(|(day, date)| {
            if day > 0 {
                price *= (1.0 + config.market_drift + market.sample(&mut rng)).max(0.01);
            }
            (date, price)
        })
        .collect::<Vec<_>>();

    Ok(BenchmarkSeries::from_pairs(symbol, pairs))
}

/// Every asset fixed at `price` for `days`
pub fn constant_price_history(assets: &[String], days: usize, price: f64) -> Result<PriceHistory> {
    let start = SyntheticConfig::default().start;
    PriceHistory::new(
        assets.to_vec(),
        dates(start, days),
        vec![vec![price; days]; assets.len()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_seeded() {
        let config = SyntheticConfig::default();
        let a = generate_price_history(&config).unwrap();
        let b = generate_price_history(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), config.days);
        assert_eq!(a.num_assets(), 3);
    }

    #[test]
    fn test_prices_stay_positive() {
        let config = SyntheticConfig {
            market_vol: 0.2,
            idio_vol: 0.2,
            days: 300,
            ..Default::default()
        };
        let history = generate_price_history(&config).unwrap();
        for i in 0..history.num_assets() {
            assert!(history.series(i).iter().all(|p| *p > 0.0));
        }
    }

    #[test]
    fn test_benchmark_covers_dates() {
        let config = SyntheticConfig::default();
        let history = generate_price_history(&config).unwrap();
        let bench = generate_benchmark(&config, "SPY").unwrap();
        for date in history.dates() {
            assert!(bench.price(date).is_some());
        }
    }

    #[test]
    fn test_constant_history() {
        let history = constant_price_history(&["X".to_string(), "Y".to_string()], 5, 42.0).unwrap();
        assert_eq!(history.row(4), vec![42.0, 42.0]);
    }
}
