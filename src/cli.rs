use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{info, warn};

use crate::analysis::{GraphView, InferenceReport, PerformanceSummary};
use crate::config::AppConfig;
use crate::data::{
    generate_benchmark, generate_price_history, CsvPriceProvider, InMemoryPriceProvider,
    PriceHistoryProvider, SyntheticConfig,
};
use crate::rl::environment::PortfolioEnvironment;
use crate::rl::graph::GraphBuilder;
use crate::rl::training::AllocationAgent;
use crate::rl::TrainBackend;
use crate::services::AllocationService;

#[derive(Parser)]
#[command(name = "graphfolio")]
#[command(version = "0.1.0")]
#[command(about = "Correlation-graph actor-critic portfolio allocator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to config/default.toml plus GRAPHFOLIO_ENV overrides)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Wide close-price CSV: date,<ticker>,<ticker>,...
    #[arg(long, global = true, env = "GRAPHFOLIO_PRICES")]
    pub prices: Option<PathBuf>,

    /// Benchmark CSV: date,close
    #[arg(long, global = true)]
    pub benchmark: Option<PathBuf>,

    /// Use a seeded synthetic market instead of price files
    #[arg(long, global = true)]
    pub synthetic: bool,

    /// Comma-separated universe (defaults to every CSV column or the configured tickers)
    #[arg(long, global = true, value_delimiter = ',')]
    pub tickers: Option<Vec<String>>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the agent and save its parameters
    Train {
        /// Number of training episodes
        #[arg(short, long)]
        episodes: Option<usize>,
        /// Parameter path (without extension)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Allocate over the latest window
    Infer {
        /// Parameter path (without extension)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Show the correlation graph of the latest window
    Graph,
    /// Deterministic backtest of saved parameters over the loaded history
    Evaluate {
        /// Parameter path (without extension)
        #[arg(short, long)]
        model: Option<String>,
    },
}

impl Cli {
    /// Config with command-line overrides applied
    pub fn app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_file(path)?,
            None => AppConfig::load()?,
        };

        if let Some(prices) = &self.prices {
            config.data.prices_path = Some(prices.to_string_lossy().into_owned());
        }
        if let Some(benchmark) = &self.benchmark {
            config.data.benchmark_path = Some(benchmark.to_string_lossy().into_owned());
        }
        if let Some(tickers) = &self.tickers {
            config.data.tickers = tickers.clone();
        }

        match &self.command {
            Commands::Train { episodes, model } => {
                if let Some(episodes) = episodes {
                    config.training.episodes = *episodes;
                }
                if let Some(model) = model {
                    config.training.model_path = model.clone();
                }
            }
            Commands::Infer { model } | Commands::Evaluate { model } => {
                if let Some(model) = model {
                    config.training.model_path = model.clone();
                }
            }
            Commands::Graph => {}
        }

        if let Err(errors) = config.validate() {
            anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
        }
        Ok(config)
    }
}

/// Build the price source and settle the universe
///
/// Synthetic data is only used when asked for. Without `--tickers`, a CSV
/// source serves every column it contains.
pub async fn price_provider(
    cli: &Cli,
    config: &mut AppConfig,
) -> anyhow::Result<Arc<dyn PriceHistoryProvider>> {
    if cli.synthetic {
        let synthetic = SyntheticConfig {
            assets: config.data.tickers.clone(),
            days: config.data.training_lookback.max(config.data.inference_lookback) + 1,
            seed: config.agent.seed.unwrap_or(7),
            ..Default::default()
        };
        let history = generate_price_history(&synthetic)?;
        let benchmark = generate_benchmark(&synthetic, &config.data.benchmark_symbol)?;
        warn!(assets = history.num_assets(), days = history.len(), "using synthetic prices");
        return Ok(Arc::new(
            InMemoryPriceProvider::new(history).with_benchmark(benchmark),
        ));
    }

    let Some(prices) = config.data.prices_path.clone() else {
        anyhow::bail!("no price source: pass --prices <csv> or --synthetic");
    };

    let mut provider = CsvPriceProvider::new(&prices);
    if let Some(benchmark) = &config.data.benchmark_path {
        provider = provider.with_benchmark(benchmark);
    }

    if cli.tickers.is_none() {
        let all = provider.fetch_history(&[], 1).await?;
        config.data.tickers = all.assets().to_vec();
        info!(count = config.data.tickers.len(), "universe taken from {}", prices);
    }

    Ok(Arc::new(provider))
}

#[derive(Tabled)]
struct AllocationRow {
    ticker: String,
    weight: String,
    #[tabled(rename = "last return")]
    last_return: String,
}

#[derive(Tabled)]
struct EdgeRow {
    source: String,
    target: String,
    correlation: String,
}

#[derive(Tabled)]
struct MetricRow {
    metric: &'static str,
    value: String,
}

fn print_json<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("(none)");
    } else {
        println!("{}", Table::new(rows));
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn print_graph(view: &GraphView) {
    print_table(
        view.edges
            .iter()
            .map(|e| EdgeRow {
                source: e.source.clone(),
                target: e.target.clone(),
                correlation: format!("{:+.3}", e.weight),
            })
            .collect(),
    );
}

pub fn print_report(report: &InferenceReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    if let Some(date) = report.as_of {
        println!("Allocation as of {}", date);
    }
    print_table(
        report
            .allocations
            .iter()
            .zip(&report.graph.nodes)
            .map(|(a, node)| AllocationRow {
                ticker: a.ticker.clone(),
                weight: pct(a.weight),
                last_return: pct(node.last_return),
            })
            .collect(),
    );
    print_table(vec![
        MetricRow {
            metric: "expected return",
            value: pct(report.metrics.expected_return),
        },
        MetricRow {
            metric: "volatility",
            value: pct(report.metrics.volatility),
        },
        MetricRow {
            metric: "sharpe",
            value: format!("{:.2}", report.metrics.sharpe_ratio),
        },
    ]);
    println!("Correlation edges:");
    print_graph(&report.graph);
    Ok(())
}

pub fn print_summary(summary: &PerformanceSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }

    print_table(vec![
        MetricRow {
            metric: "steps",
            value: summary.steps.to_string(),
        },
        MetricRow {
            metric: "total return",
            value: pct(summary.total_return),
        },
        MetricRow {
            metric: "benchmark return",
            value: pct(summary.benchmark_return),
        },
        MetricRow {
            metric: "sharpe",
            value: format!("{:.2}", summary.sharpe_ratio),
        },
        MetricRow {
            metric: "benchmark sharpe",
            value: format!("{:.2}", summary.benchmark_sharpe),
        },
        MetricRow {
            metric: "max drawdown",
            value: format!("-{}", pct(summary.max_drawdown)),
        },
        MetricRow {
            metric: "alpha",
            value: pct(summary.alpha),
        },
        MetricRow {
            metric: "beta",
            value: format!("{:.2}", summary.beta),
        },
    ]);
    Ok(())
}

/// `graphfolio train`
pub async fn run_train(cli: &Cli) -> anyhow::Result<()> {
    let mut config = cli.app_config()?;
    let provider = price_provider(cli, &mut config).await?;
    let episodes = config.training.episodes;
    let tickers = config.data.tickers.clone();

    let service = Arc::new(AllocationService::new(provider, config));
    service.configure_universe(tickers).await?;

    let handle = service.start_training(episodes).await?;

    let canceller = service.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current episode");
            canceller.cancel_training();
        }
    });

    let summary = handle.await??;
    ctrl_c.abort();

    let status = service.training_status().await;
    if cli.json {
        print_json(&status)?;
    } else {
        println!(
            "Training {:?}: {}/{} episodes, last reward {:.4}, {} skipped updates",
            status.state,
            status.episode,
            status.total_episodes,
            status.last_reward,
            summary.skipped_updates
        );
        println!("Parameters saved to {}", service.config().training.model_path);
    }
    Ok(())
}

/// `graphfolio infer`
pub async fn run_infer(cli: &Cli) -> anyhow::Result<()> {
    let mut config = cli.app_config()?;
    let provider = price_provider(cli, &mut config).await?;
    let tickers = config.data.tickers.clone();

    let service = AllocationService::new(provider, config);
    service.configure_universe(tickers).await?;
    let report = service.infer().await?;
    print_report(&report, cli.json)
}

/// `graphfolio graph`
pub async fn run_graph(cli: &Cli) -> anyhow::Result<()> {
    let mut config = cli.app_config()?;
    let provider = price_provider(cli, &mut config).await?;

    let history = provider
        .fetch_history(&config.data.tickers, config.data.inference_lookback)
        .await?;
    let snapshot = GraphBuilder::new(config.graph.clone()).build(&history.full_window());
    let view = GraphView::from_snapshot(history.assets(), &snapshot);

    if cli.json {
        return print_json(&view);
    }
    println!(
        "{} nodes, {} directed edges (window {}, threshold {})",
        snapshot.num_nodes(),
        snapshot.num_edges(),
        config.graph.window_size,
        config.graph.correlation_threshold
    );
    print_graph(&view);
    Ok(())
}

/// `graphfolio evaluate`
pub async fn run_evaluate(cli: &Cli) -> anyhow::Result<()> {
    let mut config = cli.app_config()?;
    let provider = price_provider(cli, &mut config).await?;

    let history = provider
        .fetch_history(&config.data.tickers, config.data.training_lookback)
        .await?;
    let benchmark = match provider.fetch_benchmark(&config.data.benchmark_symbol).await {
        Ok(series) => Some(series),
        Err(e) => {
            warn!(error = %e, "evaluating without a benchmark");
            None
        }
    };

    let mut env = PortfolioEnvironment::new(
        history,
        benchmark,
        config.graph.clone(),
        config.reward.clone(),
    )?;

    let mut agent = AllocationAgent::<TrainBackend>::new(
        env.num_assets(),
        config.agent.clone(),
        Default::default(),
    )?;
    if !agent.load_model(&config.training.model_path)? {
        warn!(
            path = %config.training.model_path,
            "no saved parameters, evaluating an untrained policy"
        );
    }

    let run = agent.evaluate(&mut env)?;
    print_summary(&PerformanceSummary::from_run(&run), cli.json)
}
