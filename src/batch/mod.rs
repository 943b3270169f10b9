//! Batch Creation Module
//!
//! This module handles pre-commit batching:
//! - cutoff: per-sector deadlines and the loop's wait interval
//! - trigger: when to send, and batch vs individual messages
//! - engine: builds and sends the messages
//! - orchestrator: the background loop and the caller-facing protocol

pub mod cutoff;
mod engine;
pub mod orchestrator;
pub mod trigger;


pub use engine::{total_deposit, BatchEngine};
pub use orchestrator::PreCommitBatcher;
