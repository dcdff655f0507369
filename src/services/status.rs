//! Training job status shared between the worker and readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Progress of the current or most recent training job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub state: TrainingState,
    /// Episodes finished so far
    pub episode: usize,
    pub total_episodes: usize,
    /// Total reward of the last finished episode
    pub last_reward: f32,
    /// Updates skipped on a non-finite loss during this job
    pub skipped_updates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrainingStatus {
    pub fn running(total_episodes: usize) -> Self {
        Self {
            state: TrainingState::Running,
            total_episodes,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn is_training(&self) -> bool {
        self.state == TrainingState::Running
    }

    /// Mark the job finished with `state`
    pub fn finish(&mut self, state: TrainingState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let status = TrainingStatus::default();
        assert_eq!(status.state, TrainingState::Idle);
        assert!(!status.is_training());
    }

    #[test]
    fn test_lifecycle() {
        let mut status = TrainingStatus::running(10);
        assert!(status.is_training());
        assert_eq!(status.total_episodes, 10);
        assert!(status.started_at.is_some());

        status.finish(TrainingState::Failed, Some("boom".into()));
        assert!(!status.is_training());
        assert_eq!(status.error.as_deref(), Some("boom"));
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&TrainingState::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
