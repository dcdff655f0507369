//! Allocation service
//!
//! Owns one agent for the configured universe. Training runs on a blocking
//! worker with at most one job at a time; inference reads the most recently
//! published evaluation copy of the policy, so it never sees parameters in
//! the middle of an update.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::status::{TrainingState, TrainingStatus};
use crate::analysis::InferenceReport;
use crate::config::AppConfig;
use crate::data::{BenchmarkSeries, PriceHistoryProvider};
use crate::error::{GraphfolioError, Result};
use crate::rl::environment::PortfolioEnvironment;
use crate::rl::graph::GraphBuilder;
use crate::rl::training::{AllocationAgent, InferencePolicy, TrainingSummary};
use crate::rl::{InferenceBackend, TrainBackend};

/// Agent plus the universe it was built for
struct AgentResources {
    tickers: Vec<String>,
    agent: AllocationAgent<TrainBackend>,
}

/// Evaluation copy of the policy readers allocate with
#[derive(Clone)]
struct PublishedPolicy {
    tickers: Vec<String>,
    policy: InferencePolicy<InferenceBackend>,
}

/// Clears the job flag when the job ends, however it ends
struct JobGuard(Arc<AtomicBool>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct AllocationService {
    provider: Arc<dyn PriceHistoryProvider>,
    config: AppConfig,
    builder: GraphBuilder,
    /// `None` before first use and while a job owns the agent
    resources: Arc<Mutex<Option<AgentResources>>>,
    policy: Arc<Mutex<Option<PublishedPolicy>>>,
    status: Arc<RwLock<TrainingStatus>>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl AllocationService {
    pub fn new(provider: Arc<dyn PriceHistoryProvider>, config: AppConfig) -> Self {
        Self {
            provider,
            builder: GraphBuilder::new(config.graph.clone()),
            config,
            resources: Arc::new(Mutex::new(None)),
            policy: Arc::new(Mutex::new(None)),
            status: Arc::new(RwLock::new(TrainingStatus::default())),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Universe currently served
    pub async fn tickers(&self) -> Vec<String> {
        match self.policy.lock().await.as_ref() {
            Some(published) => published.tickers.clone(),
            None => self.config.data.tickers.clone(),
        }
    }

    /// Switch to a new universe
    ///
    /// A different ticker set rebuilds the agent and restores saved
    /// parameters when present. Returns `false` when the set is unchanged.
    pub async fn configure_universe(&self, tickers: Vec<String>) -> Result<bool> {
        validate_tickers(&tickers)?;

        let mut resources = self.resources.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Err(self.in_progress().await);
        }

        if let Some(current) = resources.as_ref() {
            if same_universe(&current.tickers, &tickers) {
                debug!(count = tickers.len(), "universe unchanged");
                return Ok(false);
            }
        }

        info!(count = tickers.len(), "initializing agent for new universe");
        let fresh = self.init_resources(tickers).await?;
        self.publish(&fresh).await;
        *resources = Some(fresh);
        Ok(true)
    }

    /// Allocate over the latest window of prices
    pub async fn infer(&self) -> Result<InferenceReport> {
        self.ensure_initialized().await?;

        let published = self
            .policy
            .lock()
            .await
            .clone()
            .ok_or_else(|| GraphfolioError::Internal("no policy published".to_string()))?;

        let history = self
            .provider
            .fetch_history(&published.tickers, self.config.data.inference_lookback)
            .await?;
        if history.assets() != published.tickers.as_slice() {
            return Err(GraphfolioError::InvalidMarketData(format!(
                "provider returned {:?} for universe {:?}",
                history.assets(),
                published.tickers
            )));
        }

        let snapshot = self.builder.build(&history.full_window());
        if snapshot.is_empty() {
            warn!(
                rows = history.len(),
                window = self.config.graph.window_size,
                "insufficient history, allocating from the zero snapshot"
            );
        }

        let action = published.policy.allocate(&snapshot)?;
        Ok(InferenceReport::new(&history, &snapshot, &action))
    }

    /// Start a background training job
    ///
    /// Prices are fetched before the job starts; the returned handle
    /// resolves when the worker finishes. A second job while one runs fails
    /// with [`GraphfolioError::TrainingInProgress`].
    pub async fn start_training(
        &self,
        episodes: usize,
    ) -> Result<JoinHandle<Result<TrainingSummary>>> {
        if episodes == 0 {
            return Err(GraphfolioError::InvalidConfig(
                "episodes must be positive".to_string(),
            ));
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(self.in_progress().await);
        }
        let guard = JobGuard(self.running.clone());
        // Cleared before any await so a cancel during the price fetch is kept
        self.cancel.store(false, Ordering::SeqCst);

        let resources = self.take_resources().await?;
        let env = match self.training_environment(&resources.tickers).await {
            Ok(env) => env,
            Err(e) => {
                *self.resources.lock().await = Some(resources);
                return Err(e);
            }
        };

        *self.status.write().await = TrainingStatus::running(episodes);
        info!(
            episodes,
            steps_per_episode = env.episode_length(),
            assets = resources.tickers.len(),
            "training job started"
        );

        let job = TrainingJob {
            resources,
            env,
            episodes,
            model_path: self.config.training.model_path.clone(),
            save_on_completion: self.config.training.save_on_completion,
            log_every: self.config.training.log_every,
            slot: self.resources.clone(),
            policy: self.policy.clone(),
            status: self.status.clone(),
            cancel: self.cancel.clone(),
            guard,
        };

        Ok(tokio::task::spawn_blocking(move || job.run()))
    }

    pub async fn training_status(&self) -> TrainingStatus {
        self.status.read().await.clone()
    }

    /// Ask the running job to stop after its current episode
    pub fn cancel_training(&self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            self.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn in_progress(&self) -> GraphfolioError {
        let status = self.status.read().await;
        GraphfolioError::TrainingInProgress {
            episode: status.episode,
            total: status.total_episodes,
        }
    }

    /// Fresh agent for `tickers`, restored from disk on a blocking worker
    async fn init_resources(&self, tickers: Vec<String>) -> Result<AgentResources> {
        let agent_config = self.config.agent.clone();
        let model_path = self.config.training.model_path.clone();

        tokio::task::spawn_blocking(move || -> Result<AgentResources> {
            let mut agent = AllocationAgent::new(tickers.len(), agent_config, Default::default())?;
            let restored = agent.load_model(&model_path)?;
            debug!(restored, "agent resources ready");
            Ok(AgentResources { tickers, agent })
        })
        .await
        .map_err(|e| GraphfolioError::Internal(format!("agent initialization task failed: {}", e)))?
    }

    async fn publish(&self, resources: &AgentResources) {
        *self.policy.lock().await = Some(PublishedPolicy {
            tickers: resources.tickers.clone(),
            policy: resources.agent.inference_policy(),
        });
    }

    /// Build the default universe on first use
    async fn ensure_initialized(&self) -> Result<()> {
        let mut resources = self.resources.lock().await;
        if resources.is_none() && !self.running.load(Ordering::SeqCst) {
            let fresh = self.init_resources(self.config.data.tickers.clone()).await?;
            self.publish(&fresh).await;
            *resources = Some(fresh);
        }
        Ok(())
    }

    async fn take_resources(&self) -> Result<AgentResources> {
        let mut resources = self.resources.lock().await;
        match resources.take() {
            Some(existing) => Ok(existing),
            None => {
                let fresh = self.init_resources(self.config.data.tickers.clone()).await?;
                self.publish(&fresh).await;
                Ok(fresh)
            }
        }
    }

    async fn training_environment(&self, tickers: &[String]) -> Result<PortfolioEnvironment> {
        let history = self
            .provider
            .fetch_history(tickers, self.config.data.training_lookback)
            .await?;
        let benchmark = self.fetch_benchmark().await;

        PortfolioEnvironment::new(
            history,
            benchmark,
            self.config.graph.clone(),
            self.config.reward.clone(),
        )
    }

    /// A missing benchmark trains against zero benchmark returns
    async fn fetch_benchmark(&self) -> Option<BenchmarkSeries> {
        let symbol = &self.config.data.benchmark_symbol;
        match self.provider.fetch_benchmark(symbol).await {
            Ok(series) => Some(series),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "benchmark unavailable, using zero returns");
                None
            }
        }
    }
}

/// Everything the blocking worker owns
struct TrainingJob {
    resources: AgentResources,
    env: PortfolioEnvironment,
    episodes: usize,
    model_path: String,
    save_on_completion: bool,
    log_every: usize,
    slot: Arc<Mutex<Option<AgentResources>>>,
    policy: Arc<Mutex<Option<PublishedPolicy>>>,
    status: Arc<RwLock<TrainingStatus>>,
    cancel: Arc<AtomicBool>,
    guard: JobGuard,
}

impl TrainingJob {
    fn run(self) -> Result<TrainingSummary> {
        let TrainingJob {
            mut resources,
            mut env,
            episodes,
            model_path,
            save_on_completion,
            log_every,
            slot,
            policy,
            status,
            cancel,
            guard,
        } = self;

        let tickers = resources.tickers.clone();
        let mut skipped = 0;
        let outcome = resources.agent.train_with_control(
            &mut env,
            episodes,
            &cancel,
            |report, agent| {
                if !report.applied {
                    skipped += 1;
                }
                {
                    let mut status = status.blocking_write();
                    status.episode = report.episode + 1;
                    status.last_reward = report.total_reward;
                    status.skipped_updates = skipped;
                }
                if report.applied {
                    *policy.blocking_lock() = Some(PublishedPolicy {
                        tickers: tickers.clone(),
                        policy: agent.inference_policy(),
                    });
                }
                if log_every > 0 && (report.episode + 1) % log_every == 0 {
                    info!(
                        episode = report.episode + 1,
                        total = episodes,
                        reward = report.total_reward,
                        loss = report.total_loss,
                        "episode finished"
                    );
                }
            },
        );

        let outcome = outcome.and_then(|summary| {
            if save_on_completion {
                resources.agent.save_model(&model_path)?;
            }
            Ok(summary)
        });

        *slot.blocking_lock() = Some(resources);

        {
            let mut status = status.blocking_write();
            match &outcome {
                Ok(summary) if summary.cancelled => status.finish(TrainingState::Cancelled, None),
                Ok(_) => status.finish(TrainingState::Completed, None),
                Err(e) => {
                    error!(error = %e, "training job failed");
                    status.finish(TrainingState::Failed, Some(e.to_string()));
                }
            }
        }

        drop(guard);
        outcome
    }
}

fn validate_tickers(tickers: &[String]) -> Result<()> {
    if tickers.is_empty() {
        return Err(GraphfolioError::EmptyUniverse);
    }
    let mut seen = HashSet::new();
    for ticker in tickers {
        if ticker.trim().is_empty() || !seen.insert(ticker.as_str()) {
            return Err(GraphfolioError::InvalidConfig(format!(
                "invalid or duplicate ticker {:?}",
                ticker
            )));
        }
    }
    Ok(())
}

/// Same tickers in the same order
///
/// Order matters because node `i` is asset `i` in every snapshot.
fn same_universe(current: &[String], requested: &[String]) -> bool {
    current == requested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::MockPriceHistoryProvider;
    use crate::data::{generate_price_history, InMemoryPriceProvider, PriceHistory, SyntheticConfig};
    use std::env::temp_dir;

    fn tickers() -> Vec<String> {
        vec!["AAA".into(), "BBB".into(), "CCC".into()]
    }

    fn history(days: usize) -> PriceHistory {
        generate_price_history(&SyntheticConfig {
            assets: tickers(),
            days,
            ..Default::default()
        })
        .unwrap()
    }

    fn config(name: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.data.tickers = tickers();
        config.graph.window_size = 5;
        config.agent.hidden_dim = 8;
        config.agent.seed = Some(11);
        config.training.log_every = 0;
        config.training.model_path = temp_dir()
            .join(format!("graphfolio_svc_{}_{}", name, std::process::id()))
            .join("agent")
            .to_string_lossy()
            .into_owned();
        config
    }

    fn service(name: &str, days: usize) -> AllocationService {
        let provider = InMemoryPriceProvider::new(history(days));
        AllocationService::new(Arc::new(provider), config(name))
    }

    #[tokio::test]
    async fn test_infer_initializes_default_universe() {
        let service = service("infer", 40);
        let report = service.infer().await.unwrap();

        assert_eq!(report.tickers, tickers());
        let total: f64 = report.allocations.iter().map(|a| a.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(report.allocations.iter().all(|a| a.weight > 0.0));
        assert_eq!(report.graph.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_infer_is_deterministic() {
        let service = service("determinism", 40);
        let a = service.infer().await.unwrap();
        let b = service.infer().await.unwrap();
        assert_eq!(a.allocations, b.allocations);
    }

    #[tokio::test]
    async fn test_infer_with_short_history_uses_zero_snapshot() {
        let service = service("short", 3);
        let report = service.infer().await.unwrap();
        assert!(report.graph.edges.is_empty());
        assert_eq!(report.allocations.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_is_surfaced() {
        let mut provider = MockPriceHistoryProvider::new();
        provider.expect_fetch_history().returning(|_, _| {
            Err(GraphfolioError::MarketDataUnavailable("offline".to_string()))
        });
        let service = AllocationService::new(Arc::new(provider), config("offline"));

        let err = service.infer().await.unwrap_err();
        assert!(matches!(err, GraphfolioError::MarketDataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_configure_universe() {
        let service = service("universe", 40);

        assert!(service.configure_universe(tickers()).await.unwrap());
        assert!(!service.configure_universe(tickers()).await.unwrap());

        let subset = vec!["CCC".to_string(), "AAA".to_string()];
        assert!(service.configure_universe(subset.clone()).await.unwrap());
        assert_eq!(service.tickers().await, subset);

        let report = service.infer().await.unwrap();
        assert_eq!(report.tickers, subset);
    }

    #[tokio::test]
    async fn test_configure_rejects_bad_universe() {
        let service = service("bad_universe", 40);
        assert!(matches!(
            service.configure_universe(Vec::new()).await,
            Err(GraphfolioError::EmptyUniverse)
        ));
        assert!(service
            .configure_universe(vec!["AAA".into(), "AAA".into()])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_training_job_completes_and_saves() {
        let service = service("train", 30);
        let path = service.config().training.model_path.clone();

        let handle = service.start_training(2).await.unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.episodes_run, 2);

        let status = service.training_status().await;
        assert_eq!(status.state, TrainingState::Completed);
        assert_eq!(status.episode, 2);
        assert_eq!(status.total_episodes, 2);
        assert!(crate::rl::Checkpointer::new(&path).exists());

        // the agent is back in place for the next job
        let again = service.start_training(1).await.unwrap();
        assert!(again.await.unwrap().is_ok());

        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_second_job_is_rejected() {
        let service = service("exclusive", 60);

        let (first, second) = tokio::join!(service.start_training(500), service.start_training(1));
        let handle = first.unwrap();
        assert!(matches!(
            second,
            Err(GraphfolioError::TrainingInProgress { .. })
        ));
        assert!(matches!(
            service.configure_universe(vec!["AAA".into()]).await,
            Err(GraphfolioError::TrainingInProgress { .. })
        ));

        assert!(service.cancel_training());
        let summary = handle.await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(service.training_status().await.state, TrainingState::Cancelled);
        assert!(!service.cancel_training());

        let path = service.config().training.model_path.clone();
        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_insufficient_training_history_releases_job() {
        let service = service("too_short", 6);

        let err = service.start_training(1).await.unwrap_err();
        assert!(matches!(err, GraphfolioError::InsufficientHistory { .. }));
        assert_eq!(service.training_status().await.state, TrainingState::Idle);

        // the slot is free again and the agent was returned
        assert!(service.configure_universe(vec!["AAA".into()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_episodes_rejected() {
        let service = service("zero", 30);
        assert!(matches!(
            service.start_training(0).await,
            Err(GraphfolioError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_during_price_fetch_is_kept() {
        let slot: Arc<std::sync::OnceLock<Arc<AllocationService>>> = Arc::default();
        let data = history(30);

        let mut provider = MockPriceHistoryProvider::new();
        let handle_slot = slot.clone();
        provider.expect_fetch_history().returning(move |_, _| {
            if let Some(service) = handle_slot.get() {
                assert!(service.cancel_training());
            }
            Ok(data.clone())
        });
        provider.expect_fetch_benchmark().returning(|_| {
            Err(GraphfolioError::MarketDataUnavailable("no benchmark".to_string()))
        });

        let service = Arc::new(AllocationService::new(Arc::new(provider), config("early_cancel")));
        assert!(slot.set(service.clone()).is_ok());

        let summary = service.start_training(5).await.unwrap().await.unwrap().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.episodes_run, 0);

        let status = service.training_status().await;
        assert_eq!(status.state, TrainingState::Cancelled);
        assert_eq!(status.episode, 0);

        let path = service.config().training.model_path.clone();
        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_new_service_restores_saved_parameters() {
        let trained = service("restore", 30);
        let handle = trained.start_training(2).await.unwrap();
        handle.await.unwrap().unwrap();
        let expected = trained.infer().await.unwrap();

        let restored = service("restore", 30);
        assert!(restored.configure_universe(tickers()).await.unwrap());
        let actual = restored.infer().await.unwrap();
        assert_eq!(expected.allocations, actual.allocations);

        let path = restored.config().training.model_path.clone();
        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
