//! Batch Orchestrator Module
//!
//! Runs the background loop that turns registered sectors into pre-commit
//! messages, and the caller-facing protocol around it.
//!
//! # Loop
//! The loop sleeps until the first of:
//! - the wait interval elapses (earliest cutoff minus slack, capped by the batch wait)
//! - a sector is registered (coalesced into a single pending notification)
//! - a caller requests a flush
//! - stop is requested
//!
//! then runs one processing step, fans results out to waiting callers, and
//! recomputes the wait interval.
//!
//! # Stop
//! Sectors still pending when the loop stops are abandoned in memory. Their
//! callers stay blocked until their own cancellation token fires, so every
//! caller should bound its wait. Registrations after stop are rejected.

use crate::{
    batch::{
        cutoff::{batch_wait, precommit_cutoff},
        engine::BatchEngine,
        trigger::{should_defer, Wake},
    },
    chain::ChainApi,
    config::{ConfigSource, SealingConfig},
    pool::{PendingEntry, PendingSet},
    Address, BatcherError, PreCommitBatchRes, SectorId, SectorInfo, SectorPreCommitInfo,
    TokenAmount,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type StepResult = Result<Vec<PreCommitBatchRes>, BatcherError>;

/// Handle to a running pre-commit batcher.
///
/// Dropping the handle stops the loop.
pub struct PreCommitBatcher {
    /// Miner actor the batches are sent to
    maddr: Address,
    /// Chain head source for cutoff computation at registration
    api: Arc<dyn ChainApi>,
    /// Sectors and waiters shared with the loop
    pending: Arc<PendingSet>,
    /// Wall-clock length of one epoch
    block_delay: Duration,
    /// Coalesced "something was registered" signal
    notify: mpsc::Sender<()>,
    /// Flush requests, each carrying the channel for its step result
    force: mpsc::Sender<oneshot::Sender<StepResult>>,
    /// Requests loop shutdown
    stop: CancellationToken,
    /// Cancelled once the loop has exited
    stopped: CancellationToken,
}

/// State owned by the loop task.
struct Runner {
    engine: BatchEngine,
    pending: Arc<PendingSet>,
    config: Arc<dyn ConfigSource>,
    /// Config read at the start of the current cycle
    cfg: SealingConfig,
    notify: mpsc::Receiver<()>,
    force: mpsc::Receiver<oneshot::Sender<StepResult>>,
    stop: CancellationToken,
    stopped: CancellationToken,
}

impl PreCommitBatcher {
    /// Spawns the batching loop on the current tokio runtime.
    ///
    /// # Arguments
    /// * `engine` - Message builder for the miner, with its chain and sender
    /// * `config` - Source of the sealing config, re-read every cycle
    /// * `block_delay` - Wall-clock length of one epoch, used to turn cutoff epochs into deadlines
    ///
    /// # Returns
    /// The handle callers submit through. Fails if the sealing configuration
    /// cannot be read: the loop never runs with unknown limits.
    pub fn start(
        engine: BatchEngine,
        config: Arc<dyn ConfigSource>,
        block_delay: Duration,
    ) -> Result<Self, BatcherError> {
        let cfg = config.sealing_config()?;

        let (notify_tx, notify_rx) = mpsc::channel(1);
        let (force_tx, force_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let stopped = CancellationToken::new();
        let pending = Arc::new(PendingSet::new());

        let batcher = Self {
            maddr: engine.miner().clone(),
            api: engine.api().clone(),
            pending: pending.clone(),
            block_delay,
            notify: notify_tx,
            force: force_tx,
            stop: stop.clone(),
            stopped: stopped.clone(),
        };

        let runner = Runner {
            engine,
            pending,
            config,
            cfg,
            notify: notify_rx,
            force: force_rx,
            stop,
            stopped,
        };
        tokio::spawn(runner.run());

        Ok(batcher)
    }

    /// Register a sector for pre-commit and wait for the message that carries it.
    ///
    /// Registering the same sector again replaces its deposit and params; every
    /// caller waiting on it receives the same result. Cancelling `ctx` only
    /// releases this caller, the sector stays queued.
    pub async fn add_precommit(
        &self,
        ctx: &CancellationToken,
        sector: &SectorInfo,
        deposit: TokenAmount,
        info: SectorPreCommitInfo,
    ) -> Result<PreCommitBatchRes, BatcherError> {
        if self.stop.is_cancelled() {
            return Err(BatcherError::Stopped);
        }

        let ts = self.api.chain_head().await?;
        let cutoff = precommit_cutoff(ts.height, sector, Instant::now(), self.block_delay)?;

        let sn = sector.sector_number;
        let sent = self
            .pending
            .register(sn, Some(cutoff), PendingEntry { deposit, info });
        // Full channel means a notification is already outstanding.
        let _ = self.notify.try_send(());
        debug!(sector = sn, deposit, "Registered pre-commit");

        tokio::select! {
            res = sent => res.map_err(|_| BatcherError::Stopped),
            _ = ctx.cancelled() => Err(BatcherError::Cancelled),
        }
    }

    /// Force a processing step now and return what it produced.
    pub async fn flush(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Vec<PreCommitBatchRes>, BatcherError> {
        let (res_tx, res_rx) = oneshot::channel();

        tokio::select! {
            sent = self.force.send(res_tx) => sent.map_err(|_| BatcherError::Stopped)?,
            _ = ctx.cancelled() => return Err(BatcherError::Cancelled),
        }

        tokio::select! {
            res = res_rx => res.map_err(|_| BatcherError::Stopped)?,
            _ = ctx.cancelled() => Err(BatcherError::Cancelled),
        }
    }

    /// Sectors waiting to be pre-committed, in ascending order.
    pub async fn pending(&self, ctx: &CancellationToken) -> Result<Vec<SectorId>, BatcherError> {
        if ctx.is_cancelled() {
            return Err(BatcherError::Cancelled);
        }

        let miner = self
            .maddr
            .id()
            .ok_or_else(|| BatcherError::Address(self.maddr.to_string()))?;

        Ok(self
            .pending
            .sector_numbers()
            .into_iter()
            .map(|number| SectorId { miner, number })
            .collect())
    }

    /// Ask the loop to exit after any in-flight step and wait until it has.
    pub async fn stop(&self, ctx: &CancellationToken) -> Result<(), BatcherError> {
        self.stop.cancel();

        tokio::select! {
            _ = self.stopped.cancelled() => Ok(()),
            _ = ctx.cancelled() => Err(BatcherError::Cancelled),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }
}

impl Drop for PreCommitBatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl Runner {
    async fn run(mut self) {
        info!(
            "Pre-commit batcher starting: max_batch={}, wait={:?}, slack={:?}",
            self.cfg.max_precommit_batch,
            self.cfg.batch_wait(),
            self.cfg.batch_slack()
        );

        let timer = tokio::time::sleep(self.wait());
        tokio::pin!(timer);

        loop {
            let mut force_res = None;

            let wake = tokio::select! {
                _ = self.stop.cancelled() => break,
                Some(()) = self.notify.recv() => Wake::Notify,
                () = &mut timer => Wake::Timer,
                Some(res_tx) = self.force.recv() => {
                    force_res = Some(res_tx);
                    Wake::Flush
                }
            };

            // An unreadable config fails the step; nothing is sent on stale limits.
            let res = match self.config.sealing_config() {
                Ok(cfg) => {
                    self.cfg = cfg;
                    self.maybe_start_batch(wake).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = &res {
                warn!("PreCommitBatcher processBatch error: {}", e);
            }

            if let Some(res_tx) = force_res {
                // The flushing caller may have given up already.
                let _ = res_tx.send(res);
            }

            // `reset` discards any expiry that fired during the step.
            timer.as_mut().reset(Instant::now() + self.wait());
        }

        info!("Pre-commit batcher stopped with {} sectors pending", self.pending.len());

        // Close the flush channel before reporting shutdown.
        let stopped = self.stopped.clone();
        drop(self);
        stopped.cancel();
    }

    fn wait(&self) -> Duration {
        batch_wait(
            self.pending.cutoffs(),
            self.cfg.batch_wait(),
            self.cfg.batch_slack(),
            Instant::now(),
        )
    }

    /// One processing step. External calls happen here, outside the pending
    /// set's lock.
    async fn maybe_start_batch(&self, wake: Wake) -> StepResult {
        let total = self.pending.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        if should_defer(wake, total, self.cfg.max_precommit_batch) {
            debug!("{} of {} sectors queued, waiting for more", total, self.cfg.max_precommit_batch);
            return Ok(Vec::new());
        }

        let snapshot = self.pending.snapshot();
        let res = self.engine.process(&self.cfg, &snapshot.entries).await?;

        for r in &res {
            let delivered = self.pending.complete(&snapshot, r);
            match &r.error {
                Some(e) => warn!(sectors = ?r.sectors, "Pre-commit failed: {}", e),
                None => debug!(sectors = ?r.sectors, delivered, "Pre-commit sent"),
            }
        }

        Ok(res)
    }
}
