//! Actor-Critic Allocation Agent
//!
//! Owns the policy parameters and the optimizer. Each training episode is a
//! full rollout followed by exactly one guarded optimizer step: a
//! non-finite loss skips the step, otherwise Adam applies the update after
//! the combined gradient norm is clipped to `max_grad_norm`.

use std::sync::atomic::{AtomicBool, Ordering};

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpointing::Checkpointer;
use super::clipping::clip_grad_norm;
use super::evaluation::{policy_step, ActionMode, ActionSample, EvaluationRun, InferencePolicy};
use crate::error::{GraphfolioError, Result};
use crate::rl::algorithms::{actor_critic_loss, ActorCriticOutput};
use crate::rl::config::AgentConfig;
use crate::rl::core::GraphSnapshot;
use crate::rl::environment::PortfolioEnvironment;
use crate::rl::memory::{Trajectory, TrajectoryStep};
use crate::rl::networks::{GnnPolicy, GnnPolicyConfig};

/// Matches the usual PyTorch Adam default
pub const ADAM_EPSILON: f32 = 1e-8;

/// Adam over the policy, stepping on the autodiff backend
pub type PolicyOptimizer<B> =
    OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, GnnPolicy<B>, B>;

type OptimizerRecord<B> = <PolicyOptimizer<B> as Optimizer<GnnPolicy<B>, B>>::Record;

/// Adam settings shared by fresh and restored agents
///
/// Clipping is left off here; [`clip_grad_norm`] bounds the combined norm
/// before each step.
pub fn adam_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(ADAM_EPSILON)
}

/// Outcome of one training episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeReport {
    /// Zero-based index within the job
    pub episode: usize,
    pub steps: usize,
    pub total_reward: f32,
    pub portfolio_value: f64,
    pub benchmark_value: f64,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub total_loss: f32,
    /// False when the update was skipped on a non-finite loss
    pub applied: bool,
}

/// Result of a training job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Total reward of every episode whose update was applied
    pub reward_history: Vec<f32>,
    pub episodes_run: usize,
    pub skipped_updates: usize,
    pub cancelled: bool,
}

/// Dirichlet actor-critic over the asset graph
pub struct AllocationAgent<B: AutodiffBackend> {
    model: GnnPolicy<B>,
    optimizer: PolicyOptimizer<B>,
    config: AgentConfig,
    device: B::Device,
    rng: StdRng,
    num_assets: usize,
    updates: usize,
    skipped_updates: usize,
}

impl<B: AutodiffBackend> AllocationAgent<B> {
    /// Fresh parameters for a universe of `num_assets`
    pub fn new(num_assets: usize, config: AgentConfig, device: B::Device) -> Result<Self> {
        if num_assets == 0 {
            return Err(GraphfolioError::EmptyUniverse);
        }

        let rng = match config.seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let model = GnnPolicyConfig::new()
            .with_hidden_dim(config.hidden_dim)
            .with_dropout(config.dropout)
            .init(&device);

        Ok(Self {
            model,
            optimizer: Self::build_optimizer(),
            config,
            device,
            rng,
            num_assets,
            updates: 0,
            skipped_updates: 0,
        })
    }

    fn build_optimizer() -> PolicyOptimizer<B> {
        adam_config().init()
    }

    pub fn num_assets(&self) -> usize {
        self.num_assets
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn policy(&self) -> &GnnPolicy<B> {
        &self.model
    }

    /// Optimizer steps applied so far
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn skipped_updates(&self) -> usize {
        self.skipped_updates
    }

    /// Frozen copy of the current parameters for evaluation
    pub fn inference_policy(&self) -> InferencePolicy<B::InnerBackend> {
        InferencePolicy::new(self.model.valid(), self.device.clone())
    }

    /// Weights plus diagnostics for `snapshot`
    ///
    /// Training mode samples the Dirichlet; evaluation mode returns its mean
    /// from the dropout-free copy of the network.
    pub fn get_action(&mut self, snapshot: &GraphSnapshot, training: bool) -> Result<ActionSample> {
        self.check_snapshot(snapshot)?;
        if training {
            let step = policy_step(
                &self.model,
                snapshot,
                &self.device,
                ActionMode::Sample(&mut self.rng),
            )?;
            Ok(step.to_sample())
        } else {
            self.inference_policy().allocate(snapshot)
        }
    }

    /// Deterministic rollout with the current parameters
    pub fn evaluate(&self, env: &mut PortfolioEnvironment) -> Result<EvaluationRun> {
        self.check_env(env)?;
        self.inference_policy().evaluate(env)
    }

    /// Train for `episodes`, returning one total reward per applied update
    pub fn train(&mut self, env: &mut PortfolioEnvironment, episodes: usize) -> Result<Vec<f32>> {
        let never = AtomicBool::new(false);
        let summary = self.train_with_control(env, episodes, &never, |_, _| {})?;
        Ok(summary.reward_history)
    }

    /// Train with a cancellation flag checked between episodes and a
    /// callback after every episode
    ///
    /// The callback also receives the agent, so callers can snapshot the
    /// freshly updated parameters.
    pub fn train_with_control<F>(
        &mut self,
        env: &mut PortfolioEnvironment,
        episodes: usize,
        cancel: &AtomicBool,
        mut on_episode: F,
    ) -> Result<TrainingSummary>
    where
        F: FnMut(&EpisodeReport, &Self),
    {
        self.check_env(env)?;
        let mut summary = TrainingSummary::default();

        for episode in 0..episodes {
            if cancel.load(Ordering::SeqCst) {
                info!(episode, "training cancelled");
                summary.cancelled = true;
                break;
            }

            let report = self.run_episode(env, episode)?;
            summary.episodes_run += 1;
            if report.applied {
                summary.reward_history.push(report.total_reward);
            } else {
                summary.skipped_updates += 1;
            }
            on_episode(&report, &*self);
        }

        info!(
            episodes = summary.episodes_run,
            applied = summary.reward_history.len(),
            skipped = summary.skipped_updates,
            "training finished"
        );
        Ok(summary)
    }

    /// One rollout and its update
    pub fn run_episode(
        &mut self,
        env: &mut PortfolioEnvironment,
        episode: usize,
    ) -> Result<EpisodeReport> {
        let mut snapshot = env.reset();
        let mut trajectory = Trajectory::new();
        let mut report = EpisodeReport {
            episode,
            ..Default::default()
        };

        loop {
            let step = policy_step(
                &self.model,
                &snapshot,
                &self.device,
                ActionMode::Sample(&mut self.rng),
            )?;
            let result = env.step(&step.weights)?;

            trajectory.push(TrajectoryStep {
                log_prob: step.log_prob,
                value: step.value,
                entropy: step.entropy,
                reward: result.reward as f32,
            });

            report.portfolio_value = result.info.portfolio_value;
            report.benchmark_value = result.info.benchmark_value;
            snapshot = result.snapshot;
            if result.done {
                break;
            }
        }

        report.steps = trajectory.len();
        report.total_reward = trajectory.total_reward();

        if let Some(output) = self.update(&trajectory) {
            report.policy_loss = output.policy_loss;
            report.value_loss = output.value_loss;
            report.entropy = output.entropy;
            report.total_loss = output.total_loss;
            report.applied = output.is_finite();
        }

        debug!(
            episode,
            reward = report.total_reward,
            loss = report.total_loss,
            portfolio_value = report.portfolio_value,
            applied = report.applied,
            "episode complete"
        );
        Ok(report)
    }

    /// Single optimizer step over the whole trajectory
    fn update(&mut self, trajectory: &Trajectory<B>) -> Option<ActorCriticOutput> {
        let loss = actor_critic_loss(trajectory, &self.config, &self.device)?;

        if !loss.output.is_finite() {
            self.skipped_updates += 1;
            warn!(
                loss = loss.output.total_loss,
                steps = trajectory.len(),
                "non-finite loss, skipping update"
            );
            return Some(loss.output);
        }

        let mut grads = loss.loss.backward();
        let grad_norm =
            clip_grad_norm::<B, _>(&self.model, &mut grads, self.config.max_grad_norm as f64);
        debug!(grad_norm, "gradients clipped");
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.config.lr, self.model.clone(), grads);
        self.updates += 1;

        Some(loss.output)
    }

    /// Write parameters and optimizer state under `path`
    pub fn save_model(&self, path: &str) -> Result<()> {
        let checkpointer = Checkpointer::new(path);
        checkpointer.save_module::<B, _>(&self.model)?;
        checkpointer.save_optimizer::<B, _>(self.optimizer.to_record())?;
        Ok(())
    }

    /// Restore parameters from `path`; `Ok(false)` keeps fresh parameters
    /// when nothing has been saved there
    pub fn load_model(&mut self, path: &str) -> Result<bool> {
        let checkpointer = Checkpointer::new(path);
        if !checkpointer.exists() {
            info!(path, "no saved model, using fresh parameters");
            return Ok(false);
        }

        self.model = checkpointer.load_module::<B, _>(self.model.clone(), &self.device)?;

        let optimizer = Self::build_optimizer();
        self.optimizer = if checkpointer.has_optimizer_state() {
            let record: OptimizerRecord<B> = checkpointer.load_optimizer::<B, _>(&self.device)?;
            optimizer.load_record(record)
        } else {
            warn!(path, "optimizer state missing, starting a fresh optimizer");
            optimizer
        };

        info!(path, "model loaded");
        Ok(true)
    }

    fn check_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        if snapshot.num_nodes() != self.num_assets {
            return Err(GraphfolioError::Model(format!(
                "snapshot has {} nodes, agent expects {}",
                snapshot.num_nodes(),
                self.num_assets
            )));
        }
        Ok(())
    }

    fn check_env(&self, env: &PortfolioEnvironment) -> Result<()> {
        if env.num_assets() != self.num_assets {
            return Err(GraphfolioError::Model(format!(
                "environment has {} assets, agent expects {}",
                env.num_assets(),
                self.num_assets
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{generate_price_history, SyntheticConfig};
    use crate::rl::config::{GraphConfig, RewardConfig};
    use crate::rl::core::{RewardFunction, RewardSignal, RewardTransition};
    use crate::rl::TrainBackend;

    struct NanReward;

    impl RewardFunction for NanReward {
        fn compute(&self, _transition: &RewardTransition<'_>) -> RewardSignal {
            RewardSignal {
                total: f64::NAN,
                ..Default::default()
            }
        }
    }

    fn agent(n: usize) -> AllocationAgent<TrainBackend> {
        let config = AgentConfig {
            hidden_dim: 16,
            seed: Some(3),
            ..Default::default()
        };
        AllocationAgent::new(n, config, Default::default()).unwrap()
    }

    fn env(days: usize) -> PortfolioEnvironment {
        let history = generate_price_history(&SyntheticConfig {
            days,
            ..Default::default()
        })
        .unwrap();
        let graph = GraphConfig {
            window_size: 5,
            ..Default::default()
        };
        PortfolioEnvironment::new(history, None, graph, RewardConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_universe_rejected() {
        let result = AllocationAgent::<TrainBackend>::new(0, AgentConfig::default(), Default::default());
        assert!(matches!(result, Err(GraphfolioError::EmptyUniverse)));
    }

    #[test]
    fn test_training_action_on_simplex() {
        let mut agent = agent(3);
        let mut env = env(15);
        let snapshot = env.reset();

        let sample = agent.get_action(&snapshot, true).unwrap();
        assert_eq!(sample.weights.len(), 3);
        assert!(sample.weights.iter().all(|w| *w > 0.0));
        assert!((sample.weights.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(sample.log_prob.is_finite());
        assert!(sample.entropy.is_finite());
    }

    #[test]
    fn test_evaluation_action_is_deterministic() {
        let mut agent = agent(3);
        let mut env = env(15);
        let snapshot = env.reset();

        let a = agent.get_action(&snapshot, false).unwrap();
        let b = agent.get_action(&snapshot, false).unwrap();
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn test_snapshot_size_mismatch() {
        let mut agent = agent(4);
        assert!(agent.get_action(&GraphSnapshot::empty(3), false).is_err());
    }

    #[test]
    fn test_one_update_per_episode() {
        let mut agent = agent(3);
        let mut env = env(15);

        let history = agent.train(&mut env, 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(agent.updates(), 3);
        assert!(history.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn test_cancel_before_start() {
        let mut agent = agent(3);
        let mut env = env(15);
        let cancel = AtomicBool::new(true);

        let summary = agent
            .train_with_control(&mut env, 5, &cancel, |_, _| {})
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.episodes_run, 0);
        assert_eq!(agent.updates(), 0);
    }

    #[test]
    fn test_callback_sees_every_episode() {
        let mut agent = agent(3);
        let mut env = env(12);
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        agent
            .train_with_control(&mut env, 2, &cancel, |report, _| seen.push(report.episode))
            .unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_environment_size_mismatch() {
        let mut agent = agent(2);
        let mut env = env(12);
        assert!(agent.train(&mut env, 1).is_err());
    }

    #[test]
    fn test_non_finite_loss_skips_every_update() {
        let mut agent = agent(3);
        let mut env = env(15).with_reward_function(Box::new(NanReward));
        let snapshot = env.reset();
        let before = agent.get_action(&snapshot, false).unwrap();

        let cancel = AtomicBool::new(false);
        let mut applied = Vec::new();
        let summary = agent
            .train_with_control(&mut env, 3, &cancel, |report, _| applied.push(report.applied))
            .unwrap();

        assert!(summary.reward_history.is_empty());
        assert_eq!(summary.episodes_run, 3);
        assert_eq!(summary.skipped_updates, 3);
        assert_eq!(applied, vec![false, false, false]);
        assert_eq!(agent.skipped_updates(), 3);
        assert_eq!(agent.updates(), 0);

        let after = agent.get_action(&snapshot, false).unwrap();
        assert_eq!(before.weights, after.weights);
        assert_eq!(before.value, after.value);
    }

    #[test]
    fn test_adam_epsilon() {
        let json = serde_json::to_value(adam_config()).unwrap();
        let epsilon = json["epsilon"].as_f64().unwrap();
        assert!((epsilon - 1e-8).abs() < 1e-12);
        assert!(json["grad_clipping"].is_null());
    }
}
