//! Price History
//!
//! Per-asset close series aligned on a shared date index, plus the
//! benchmark series used for excess-return rewards.

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GraphfolioError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Close prices for a fixed asset universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    /// One close series per asset, each `dates.len()` long
    closes: Vec<Vec<f64>>,
}

impl PriceHistory {
    /// Build a validated history
    ///
    /// Fails on an empty universe, duplicate tickers, series whose length
    /// differs from the date index, unordered dates, and negative or
    /// non-finite prices.
    pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, closes: Vec<Vec<f64>>) -> Result<Self> {
        if assets.is_empty() {
            return Err(GraphfolioError::EmptyUniverse);
        }

        let mut seen = HashSet::new();
        for asset in &assets {
            if asset.trim().is_empty() {
                return Err(GraphfolioError::InvalidMarketData(
                    "blank asset identifier".to_string(),
                ));
            }
            if !seen.insert(asset.as_str()) {
                return Err(GraphfolioError::InvalidMarketData(format!(
                    "duplicate asset {}",
                    asset
                )));
            }
        }

        if closes.len() != assets.len() {
            return Err(GraphfolioError::InvalidMarketData(format!(
                "{} close series for {} assets",
                closes.len(),
                assets.len()
            )));
        }

        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GraphfolioError::InvalidMarketData(
                "dates must be strictly increasing".to_string(),
            ));
        }

        for (asset, series) in assets.iter().zip(&closes) {
            if series.len() != dates.len() {
                return Err(GraphfolioError::InvalidMarketData(format!(
                    "{} has {} prices for {} dates",
                    asset,
                    series.len(),
                    dates.len()
                )));
            }
            if let Some(bad) = series.iter().find(|p| !p.is_finite() || **p < 0.0) {
                return Err(GraphfolioError::InvalidMarketData(format!(
                    "{} has invalid close {}",
                    asset, bad
                )));
            }
        }

        Ok(Self {
            assets,
            dates,
            closes,
        })
    }

    /// Parse a wide CSV: `date,<asset>,<asset>,...` with one row per date
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        if headers.len() < 2 {
            return Err(GraphfolioError::InvalidMarketData(
                "price file needs a date column and at least one asset column".to_string(),
            ));
        }

        let assets: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
        let mut dates = Vec::new();
        let mut closes = vec![Vec::new(); assets.len()];

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let raw_date = record.get(0).unwrap_or_default();
            dates.push(parse_date(raw_date)?);

            for (i, series) in closes.iter_mut().enumerate() {
                let cell = record.get(i + 1).unwrap_or_default().trim();
                let price = cell.parse::<f64>().map_err(|_| {
                    GraphfolioError::InvalidMarketData(format!(
                        "row {}: cannot parse close {:?} for {}",
                        line + 2,
                        cell,
                        assets[i]
                    ))
                })?;
                series.push(price);
            }
        }

        Self::new(assets, dates, closes)
    }

    /// Restrict (and reorder) the universe to `assets`
    pub fn select(&self, assets: &[String]) -> Result<Self> {
        let mut closes = Vec::with_capacity(assets.len());
        for asset in assets {
            let idx = self.asset_index(asset).ok_or_else(|| {
                GraphfolioError::MarketDataUnavailable(format!("no prices for {}", asset))
            })?;
            closes.push(self.closes[idx].clone());
        }
        Self::new(assets.to_vec(), self.dates.clone(), closes)
    }

    /// Keep only the last `rows` dates
    pub fn tail(&self, rows: usize) -> Self {
        let start = self.len().saturating_sub(rows);
        Self {
            assets: self.assets.clone(),
            dates: self.dates[start..].to_vec(),
            closes: self.closes.iter().map(|s| s[start..].to_vec()).collect(),
        }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of dates
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Full close series of one asset
    pub fn series(&self, asset_idx: usize) -> &[f64] {
        &self.closes[asset_idx]
    }

    /// Close of every asset at row `t`
    pub fn row(&self, t: usize) -> Vec<f64> {
        self.closes.iter().map(|s| s[t]).collect()
    }

    /// Rows `[start, end)` of every series
    pub fn window(&self, start: usize, end: usize) -> PriceWindow<'_> {
        let end = end.min(self.len());
        let start = start.min(end);
        PriceWindow::new(self.closes.iter().map(|s| &s[start..end]).collect())
    }

    /// Entire history as a window
    pub fn full_window(&self) -> PriceWindow<'_> {
        self.window(0, self.len())
    }
}

/// Borrowed per-asset close slices of equal length
#[derive(Debug, Clone)]
pub struct PriceWindow<'a> {
    series: Vec<&'a [f64]>,
}

impl<'a> PriceWindow<'a> {
    pub fn new(series: Vec<&'a [f64]>) -> Self {
        Self { series }
    }

    pub fn num_assets(&self) -> usize {
        self.series.len()
    }

    /// Rows available (shortest series)
    pub fn len(&self) -> usize {
        self.series.iter().map(|s| s.len()).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn series(&self, asset_idx: usize) -> &'a [f64] {
        self.series[asset_idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [f64]> + '_ {
        self.series.iter().copied()
    }
}

/// Benchmark close prices keyed by date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    pub symbol: String,
    prices: BTreeMap<NaiveDate, f64>,
}

impl BenchmarkSeries {
    pub fn new(symbol: impl Into<String>, prices: BTreeMap<NaiveDate, f64>) -> Self {
        Self {
            symbol: symbol.into(),
            prices,
        }
    }

    pub fn from_pairs(symbol: impl Into<String>, pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self::new(symbol, pairs.into_iter().collect())
    }

    /// Parse `date,close` rows (extra columns ignored)
    pub fn from_csv_reader<R: Read>(symbol: impl Into<String>, reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut prices = BTreeMap::new();

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let date = parse_date(record.get(0).unwrap_or_default())?;
            let cell = record.get(1).unwrap_or_default().trim();
            let close = cell.parse::<f64>().map_err(|_| {
                GraphfolioError::InvalidMarketData(format!(
                    "benchmark row {}: cannot parse close {:?}",
                    line + 2,
                    cell
                ))
            })?;
            prices.insert(date, close);
        }

        Ok(Self::new(symbol, prices))
    }

    pub fn price(&self, date: &NaiveDate) -> Option<f64> {
        self.prices.get(date).copied()
    }

    /// Simple return from `from` to `to`, if both dates are present and usable
    pub fn return_between(&self, from: &NaiveDate, to: &NaiveDate) -> Option<f64> {
        let p0 = self.price(from)?;
        let p1 = self.price(to)?;
        let ret = (p1 - p0) / p0;
        ret.is_finite().then_some(ret)
    }

    /// Closes in date order
    pub fn closes(&self) -> Vec<f64> {
        self.prices.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        GraphfolioError::InvalidMarketData(format!("bad date {:?}: {}", raw, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_csv_round_trip_shape() {
        let csv = "date,AAA,BBB\n2024-01-01,10,20\n2024-01-02,11,19\n2024-01-03,12,21\n";
        let history = PriceHistory::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(history.assets(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(history.len(), 3);
        assert_eq!(history.series(1), &[20.0, 19.0, 21.0]);
        assert_eq!(history.row(1), vec![11.0, 19.0]);
    }

    #[test]
    fn test_csv_rejects_unparseable_close() {
        let csv = "date,AAA\n2024-01-01,10\n2024-01-02,n/a\n";
        let err = PriceHistory::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, GraphfolioError::InvalidMarketData(_)));
    }

    #[test]
    fn test_empty_universe_is_fatal() {
        let err = PriceHistory::new(vec![], vec![day(1)], vec![]).unwrap_err();
        assert!(matches!(err, GraphfolioError::EmptyUniverse));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = PriceHistory::new(
            vec!["AAA".into()],
            vec![day(1), day(2)],
            vec![vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, GraphfolioError::InvalidMarketData(_)));
    }

    #[test]
    fn test_select_reorders_assets() {
        let history = PriceHistory::new(
            vec!["AAA".into(), "BBB".into()],
            vec![day(1), day(2)],
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap();

        let selected = history.select(&["BBB".to_string()]).unwrap();
        assert_eq!(selected.num_assets(), 1);
        assert_eq!(selected.series(0), &[3.0, 4.0]);
        assert!(history.select(&["ZZZ".to_string()]).is_err());
    }

    #[test]
    fn test_window_clamps_bounds() {
        let history = PriceHistory::new(
            vec!["AAA".into()],
            vec![day(1), day(2), day(3)],
            vec![vec![1.0, 2.0, 3.0]],
        )
        .unwrap();

        assert_eq!(history.window(1, 10).series(0), &[2.0, 3.0]);
        assert_eq!(history.tail(2).dates(), &[day(2), day(3)]);
    }

    #[test]
    fn test_benchmark_return_requires_both_dates() {
        let bench = BenchmarkSeries::from_pairs("SPY", [(day(1), 100.0), (day(2), 101.0)]);

        let ret = bench.return_between(&day(1), &day(2)).unwrap();
        assert!((ret - 0.01).abs() < 1e-12);
        assert!(bench.return_between(&day(2), &day(3)).is_none());
    }

    #[test]
    fn test_benchmark_zero_base_is_unusable() {
        let bench = BenchmarkSeries::from_pairs("SPY", [(day(1), 0.0), (day(2), 101.0)]);
        assert!(bench.return_between(&day(1), &day(2)).is_none());
    }
}
