//! End-to-end behavior of graph construction, the environment and the agent.

use std::sync::Arc;

use graphfolio::analysis::PerformanceSummary;
use graphfolio::data::{
    constant_price_history, generate_benchmark, generate_price_history, InMemoryPriceProvider,
    PriceHistory, SyntheticConfig,
};
use graphfolio::rl::{
    AgentConfig, AllocationAgent, GraphBuilder, GraphConfig, PortfolioEnvironment, RewardConfig,
    TrainBackend, NODE_FEATURES,
};
use graphfolio::{AllocationService, AppConfig, TrainingState};

fn tickers() -> Vec<String> {
    vec!["AAA".into(), "BBB".into(), "CCC".into()]
}

fn synthetic(days: usize) -> SyntheticConfig {
    SyntheticConfig {
        assets: tickers(),
        days,
        ..Default::default()
    }
}

fn agent_config(seed: u64) -> AgentConfig {
    AgentConfig {
        hidden_dim: 16,
        seed: Some(seed),
        ..Default::default()
    }
}

fn environment(history: PriceHistory, window_size: usize) -> PortfolioEnvironment {
    let graph = GraphConfig {
        window_size,
        ..Default::default()
    };
    PortfolioEnvironment::new(history, None, graph, RewardConfig::default()).unwrap()
}

fn scratch(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("graphfolio_it_{}_{}", name, std::process::id()))
}

#[test]
fn three_asset_scenario_meets_degree_guarantee() {
    let history = generate_price_history(&synthetic(30)).unwrap();
    let builder = GraphBuilder::new(GraphConfig {
        window_size: 10,
        min_neighbors: 2,
        ..Default::default()
    });

    let snapshot = builder.build_graph(&history.full_window(), 10);
    assert_eq!(snapshot.num_nodes(), 3);
    assert_eq!(snapshot.node_features[0].len(), NODE_FEATURES);
    for node in 0..3 {
        assert!(snapshot.out_degree(node) >= 2, "node {} under-connected", node);
    }
    assert!(snapshot.edges.iter().all(|(s, t)| s != t));
}

#[test]
fn window_longer_than_history_gives_zero_snapshot() {
    let history = generate_price_history(&synthetic(8)).unwrap();
    let builder = GraphBuilder::new(GraphConfig::default());

    let snapshot = builder.build_graph(&history.full_window(), 20);
    assert_eq!(snapshot.num_nodes(), 3);
    assert!(snapshot.is_empty());
}

#[test]
fn training_samples_stay_on_the_open_simplex() {
    let mut agent = AllocationAgent::<TrainBackend>::new(3, agent_config(5), Default::default())
        .unwrap();
    let mut env = environment(generate_price_history(&synthetic(40)).unwrap(), 10);

    let mut snapshot = env.reset();
    loop {
        let action = agent.get_action(&snapshot, true).unwrap();
        assert_eq!(action.weights.len(), 3);
        assert!(action.weights.iter().all(|w| *w > 0.0 && w.is_finite()));
        assert!((action.weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let result = env.step(&action.weights).unwrap();
        snapshot = result.snapshot;
        if result.done {
            break;
        }
    }
}

#[test]
fn save_and_load_reproduce_evaluation_action() {
    let dir = scratch("roundtrip");
    let path = dir.join("agent").to_string_lossy().into_owned();

    let mut env = environment(generate_price_history(&synthetic(30)).unwrap(), 10);
    let mut trained =
        AllocationAgent::<TrainBackend>::new(3, agent_config(1), Default::default()).unwrap();
    trained.train(&mut env, 2).unwrap();
    trained.save_model(&path).unwrap();

    let mut restored =
        AllocationAgent::<TrainBackend>::new(3, agent_config(99), Default::default()).unwrap();
    assert!(restored.load_model(&path).unwrap());

    let snapshot = env.reset();
    let expected = trained.get_action(&snapshot, false).unwrap();
    let actual = restored.get_action(&snapshot, false).unwrap();
    assert_eq!(expected.weights, actual.weights);
    assert_eq!(expected.value, actual.value);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn missing_checkpoint_keeps_fresh_parameters() {
    let path = scratch("missing").join("agent").to_string_lossy().into_owned();
    let mut agent =
        AllocationAgent::<TrainBackend>::new(3, agent_config(2), Default::default()).unwrap();
    assert!(!agent.load_model(&path).unwrap());
}

#[test]
fn constant_prices_train_with_finite_loss() {
    let history = constant_price_history(&tickers(), 20, 50.0).unwrap();
    let mut env = environment(history, 5);
    let mut agent =
        AllocationAgent::<TrainBackend>::new(3, agent_config(4), Default::default()).unwrap();

    let report = agent.run_episode(&mut env, 0).unwrap();
    assert!(env.state().portfolio_returns.iter().all(|r| *r == 0.0));
    assert_eq!(report.total_reward, 0.0);
    assert!(report.total_loss.is_finite());
    assert!(report.applied);
    assert_eq!(agent.updates(), 1);
    assert_eq!(agent.skipped_updates(), 0);
}

#[test]
fn single_step_episode_updates_once() {
    // W + 2 rows leave exactly one step
    let history = generate_price_history(&synthetic(7)).unwrap();
    let mut env = environment(history, 5);
    assert_eq!(env.episode_length(), 1);

    let mut agent =
        AllocationAgent::<TrainBackend>::new(3, agent_config(8), Default::default()).unwrap();
    let rewards = agent.train(&mut env, 1).unwrap();
    assert_eq!(rewards.len(), 1);
    assert!(rewards[0].is_finite());
    assert_eq!(agent.updates(), 1);
}

#[test]
fn evaluation_rollout_produces_summary() {
    let config = synthetic(60);
    let history = generate_price_history(&config).unwrap();
    let benchmark = generate_benchmark(&config, "SPY").unwrap();
    let graph = GraphConfig {
        window_size: 10,
        ..Default::default()
    };
    let mut env =
        PortfolioEnvironment::new(history, Some(benchmark), graph, RewardConfig::default())
            .unwrap();

    let agent =
        AllocationAgent::<TrainBackend>::new(3, agent_config(6), Default::default()).unwrap();
    let run = agent.evaluate(&mut env).unwrap();
    assert_eq!(run.steps(), env.episode_length());
    assert_eq!(run.portfolio_values.len(), run.steps() + 1);

    let summary = PerformanceSummary::from_run(&run);
    assert_eq!(summary.steps, run.steps());
    assert!(summary.sharpe_ratio.is_finite());
    assert!((0.0..1.0).contains(&summary.max_drawdown));
}

#[test]
fn service_trains_then_serves_updated_policy() {
    let mut config = AppConfig::default();
    config.data.tickers = tickers();
    config.graph.window_size = 5;
    config.agent = agent_config(12);
    config.training.model_path = scratch("service")
        .join("agent")
        .to_string_lossy()
        .into_owned();
    let model_dir = scratch("service");

    let history = generate_price_history(&synthetic(40)).unwrap();
    let service = AllocationService::new(Arc::new(InMemoryPriceProvider::new(history)), config);

    tokio_test::block_on(async {
        let before = service.infer().await.unwrap();

        let handle = service.start_training(3).await.unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.episodes_run, 3);

        let status = service.training_status().await;
        assert_eq!(status.state, TrainingState::Completed);
        assert_eq!(status.episode, 3);

        let after = service.infer().await.unwrap();
        assert_eq!(after.tickers, before.tickers);
        let total: f64 = after.allocations.iter().map(|a| a.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
    });

    let _ = std::fs::remove_dir_all(model_dir);
}
