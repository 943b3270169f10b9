//! This crate batches sector pre-commit messages for a storage miner.
//! Sealing tasks register sectors with the batcher and wait; a background loop
//! aggregates them into as few chain messages as cutoffs, batch limits and the
//! current base fee allow, and hands every caller the outcome of the message
//! that carried its sector.

pub mod types; // Sector, message and chain data structures.
pub mod error; // Error kinds surfaced to callers and results.
pub mod config; // Static TOML configuration and the live sealing config source.
pub mod chain; // Chain queries and message transport.
pub mod funding; // Sender selection, collateral and aggregate fees.
pub mod pool; // Pending sectors and their waiters.
pub mod batch; // Cutoffs, trigger policy, message assembly and the batching loop.
pub mod api; // Admin JSON-RPC endpoint.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use error::BatcherError;
pub use config::Config;
pub use batch::PreCommitBatcher;
