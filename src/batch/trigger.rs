//! Batch Trigger Module
//!
//! Decides whether a wake-up should produce messages at all, and whether
//! pending sectors go out as one batch or one message each.

use crate::{config::SealingConfig, NetworkVersion, TokenAmount};

/// What woke the scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Wait interval elapsed: a cutoff is near or the batch waited long enough.
    Timer,
    /// A sector was registered.
    Notify,
    /// A caller asked for an immediate flush.
    Flush,
}

/// How pending sectors are submitted in a processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Batch,
    Individual,
}

/// A registration alone only triggers a send once a full batch is waiting.
pub fn should_defer(wake: Wake, pending: usize, max_batch: usize) -> bool {
    wake == Wake::Notify && pending < max_batch
}

/// Batching saves gas only when the base fee is high; below the configured
/// threshold sectors are sent individually. Individual pre-commits only
/// became cheaper than batches from network version 14.
pub fn submit_mode(cfg: &SealingConfig, base_fee: TokenAmount, nv: NetworkVersion) -> SubmitMode {
    let threshold = cfg.batch_precommit_above_base_fee;
    if threshold != 0 && base_fee < threshold && nv >= NetworkVersion::V14 {
        SubmitMode::Individual
    } else {
        SubmitMode::Batch
    }
}
