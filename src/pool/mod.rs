//! Pending Pool Module
//!
//! This module tracks sectors that are waiting to be pre-committed, together
//! with the callers blocked on their outcome.

mod pending;

pub use pending::{PendingEntry, PendingSet, Snapshot};
