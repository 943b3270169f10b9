//! Batch Engine Module
//!
//! Turns a snapshot of pending sectors into pre-commit messages. Depending on
//! the current base fee this is either one batch message covering up to
//! `max_precommit_batch` sectors, or one message per sector.

use crate::{
    batch::trigger::{submit_mode, SubmitMode},
    chain::{ChainApi, MessageSender},
    config::{FeeConfig, SealingConfig},
    funding::{
        collateral_send_amount, initial_available_balance, scaled_aggregate_fee,
        take_from_balance, AddressSelector, AggregateFeePolicy, BalanceAddressSelector,
        NetworkAggregateFee,
    },
    pool::PendingEntry,
    Address, BatcherError, MessageId, MinerInfo, MinerMethod, NetworkVersion,
    PreCommitBatchRes, PreCommitSectorBatchParams, SectorNumber, TokenAmount,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Message builder for one miner.
///
/// Holds every external collaborator a processing step needs. None of its
/// methods touch the pending set; callers pass a snapshot in.
pub struct BatchEngine {
    /// Miner actor receiving the messages
    maddr: Address,
    /// Chain state reads (head, version, miner info, balances)
    api: Arc<dyn ChainApi>,
    /// Pushes messages to the network
    sender: Arc<dyn MessageSender>,
    /// Picks the sending address
    selector: Arc<dyn AddressSelector>,
    /// Network fee charged for aggregating pre-commits
    fee_policy: Arc<dyn AggregateFeePolicy>,
    /// Gas fee caps
    fees: FeeConfig,
}

impl BatchEngine {
    /// Creates an engine using balance-based address selection and the
    /// network's aggregate fee schedule.
    ///
    /// # Arguments
    /// * `maddr` - Miner actor address, in ID form
    /// * `api` - Chain state access
    /// * `sender` - Message submission
    /// * `fees` - Max fee settings for individual and batch messages
    pub fn new(
        maddr: Address,
        api: Arc<dyn ChainApi>,
        sender: Arc<dyn MessageSender>,
        fees: FeeConfig,
    ) -> Self {
        Self {
            maddr,
            api,
            sender,
            selector: Arc::new(BalanceAddressSelector::default()),
            fee_policy: Arc::new(NetworkAggregateFee),
            fees,
        }
    }

    /// Replace the address selector.
    pub fn with_selector(mut self, selector: Arc<dyn AddressSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_fee_policy(mut self, fee_policy: Arc<dyn AggregateFeePolicy>) -> Self {
        self.fee_policy = fee_policy;
        self
    }

    pub fn miner(&self) -> &Address {
        &self.maddr
    }

    pub fn api(&self) -> &Arc<dyn ChainApi> {
        &self.api
    }

    /// Submit `pending` (sorted by sector number) in whichever mode the
    /// current base fee calls for.
    ///
    /// An `Err` means nothing was attempted and no sector is affected. Once
    /// messages are attempted every outcome, failed or not, is a result.
    pub async fn process(
        &self,
        cfg: &SealingConfig,
        pending: &[(SectorNumber, PendingEntry)],
    ) -> Result<Vec<PreCommitBatchRes>, BatcherError> {
        let ts = self.api.chain_head().await?;
        let nv = self.api.state_network_version(&ts.key).await?;

        match submit_mode(cfg, ts.parent_base_fee, nv) {
            SubmitMode::Individual => {
                info!(
                    "Base fee {} below {}, sending {} pre-commits individually",
                    ts.parent_base_fee,
                    cfg.batch_precommit_above_base_fee,
                    pending.len()
                );
                self.process_individually(cfg, pending).await
            }
            SubmitMode::Batch => Ok(vec![
                self.process_batch(cfg, pending, ts.parent_base_fee, nv).await,
            ]),
        }
    }

    /// Send every pending sector as its own message.
    ///
    /// Deposits are drawn from one running balance snapshot; once it is
    /// exhausted the remainder is sent from the selected wallet.
    pub async fn process_individually(
        &self,
        cfg: &SealingConfig,
        pending: &[(SectorNumber, PendingEntry)],
    ) -> Result<Vec<PreCommitBatchRes>, BatcherError> {
        let mi = self.api.state_miner_info(&self.maddr).await?;
        let mut avail = initial_available_balance(self.api.as_ref(), &self.maddr, cfg).await?;

        let mut res = Vec::with_capacity(pending.len());
        for (sn, entry) in pending {
            let mut r = PreCommitBatchRes {
                sectors: vec![*sn],
                ..Default::default()
            };
            match self.process_single(cfg, &mi, &mut avail, entry).await {
                Ok(id) => r.msg = Some(id),
                Err(e) => r.error = Some(e.to_string()),
            }
            res.push(r);
        }

        Ok(res)
    }

    async fn process_single(
        &self,
        cfg: &SealingConfig,
        mi: &MinerInfo,
        avail: &mut TokenAmount,
        entry: &PendingEntry,
    ) -> Result<MessageId, BatcherError> {
        let enc = serde_json::to_vec(&entry.info)
            .map_err(|e| BatcherError::Encoding(format!("marshaling precommit params: {e}")))?;

        let deposit = if cfg.collateral_from_miner_balance {
            take_from_balance(avail, entry.deposit)
        } else {
            entry.deposit
        };

        let max_fee = self.fees.max_precommit_gas_fee;
        let good_funds = deposit.saturating_add(max_fee);

        let from = self
            .selector
            .address_for(self.api.as_ref(), mi, good_funds, deposit)
            .await?;

        let id = self
            .sender
            .send(&from, &self.maddr, MinerMethod::PreCommitSector, deposit, max_fee, enc)
            .await?;

        debug!("Sent PreCommitSector {} for sector {}", id, entry.info.sector_number);
        Ok(id)
    }

    /// Send up to `max_precommit_batch` of `pending` as one batch message.
    ///
    /// The returned result covers every selected sector, with the error set
    /// if any part of assembling or sending failed.
    pub async fn process_batch(
        &self,
        cfg: &SealingConfig,
        pending: &[(SectorNumber, PendingEntry)],
        base_fee: TokenAmount,
        nv: NetworkVersion,
    ) -> PreCommitBatchRes {
        let take = pending.len().min(cfg.max_precommit_batch);
        if take < pending.len() {
            info!("precommit batch full, {} sectors left for later", pending.len() - take);
        }
        let selected = &pending[..take];

        let mut res = PreCommitBatchRes {
            sectors: selected.iter().map(|(sn, _)| *sn).collect(),
            ..Default::default()
        };
        match self.send_batch(cfg, selected, base_fee, nv).await {
            Ok(id) => res.msg = Some(id),
            Err(e) => res.error = Some(e.to_string()),
        }
        res
    }

    async fn send_batch(
        &self,
        cfg: &SealingConfig,
        selected: &[(SectorNumber, PendingEntry)],
        base_fee: TokenAmount,
        nv: NetworkVersion,
    ) -> Result<MessageId, BatcherError> {
        let params = PreCommitSectorBatchParams {
            sectors: selected.iter().map(|(_, e)| e.info.clone()).collect(),
        };
        let deposit = total_deposit(selected);

        let enc = serde_json::to_vec(&params).map_err(|e| {
            BatcherError::Encoding(format!("couldn't serialize PreCommitSectorBatchParams: {e}"))
        })?;

        let mi = self.api.state_miner_info(&self.maddr).await?;

        let count = selected.len();
        let max_fee = self.fees.max_precommit_batch_gas_fee.fee_for_sectors(count);
        let agg_fee = scaled_aggregate_fee(
            self.fee_policy
                .aggregate_precommit_network_fee(nv, count, base_fee)?,
        );

        let need_funds = collateral_send_amount(
            self.api.as_ref(),
            &self.maddr,
            cfg,
            deposit.saturating_add(agg_fee),
        )
        .await?;
        let good_funds = max_fee.saturating_add(need_funds);

        let from = self
            .selector
            .address_for(self.api.as_ref(), &mi, good_funds, deposit)
            .await?;

        let id = self
            .sender
            .send(
                &from,
                &self.maddr,
                MinerMethod::PreCommitSectorBatch,
                need_funds,
                max_fee,
                enc,
            )
            .await?;

        info!(
            cid = %id,
            from = %from,
            method = MinerMethod::PreCommitSectorBatch.number(),
            sectors = count,
            deposit,
            "Sent PreCommitSectorBatch message"
        );
        Ok(id)
    }
}

/// Sum of the deposits of `entries`.
pub fn total_deposit(entries: &[(SectorNumber, PendingEntry)]) -> TokenAmount {
    entries
        .iter()
        .fold(0, |acc: TokenAmount, (_, e)| acc.saturating_add(e.deposit))
}
