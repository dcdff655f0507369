//! Experience Memory
//!
//! Episode storage for on-policy updates.

pub mod trajectory;

pub use trajectory::{Trajectory, TrajectoryStep};
