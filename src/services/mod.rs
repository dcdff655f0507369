//! Services layered over the allocation core.

pub mod allocation;
pub mod status;

pub use allocation::AllocationService;
pub use status::{TrainingState, TrainingStatus};
