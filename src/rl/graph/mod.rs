//! Asset Graph Construction
//!
//! Turns trailing close-price windows into node features and a correlation
//! edge set.

pub mod builder;
pub mod features;

pub use builder::GraphBuilder;
