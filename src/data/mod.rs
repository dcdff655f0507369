//! Market data types and providers consumed by the allocation pipeline.

pub mod history;
pub mod provider;
pub mod synthetic;

pub use history::{BenchmarkSeries, PriceHistory, PriceWindow};
pub use provider::{CsvPriceProvider, InMemoryPriceProvider, PriceHistoryProvider};
pub use synthetic::{constant_price_history, generate_benchmark, generate_price_history, SyntheticConfig};
