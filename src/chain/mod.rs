//! Chain Integration Module
//!
//! This module defines how the batcher talks to the chain:
//! - `ChainApi`: read-only state queries used as decision inputs
//! - `MessageSender`: pushes a signed message and returns its id
//! - `MemoryChain`: in-memory implementation of both, backing the devnet and tests

mod memory;

pub use memory::{MemoryChain, SentMessage};

use crate::{
    Address, BatcherError, MessageId, MinerInfo, MinerMethod, NetworkVersion, TipSet,
    TokenAmount,
};
use async_trait::async_trait;

/// Read-only chain state queries.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn chain_head(&self) -> Result<TipSet, BatcherError>;

    async fn state_network_version(&self, tsk: &str) -> Result<NetworkVersion, BatcherError>;

    async fn state_miner_info(&self, maddr: &Address) -> Result<MinerInfo, BatcherError>;

    /// Miner balance not locked as collateral or vesting.
    async fn state_miner_available_balance(
        &self,
        maddr: &Address,
    ) -> Result<TokenAmount, BatcherError>;

    async fn wallet_balance(&self, addr: &Address) -> Result<TokenAmount, BatcherError>;
}

/// Submission transport for miner messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        from: &Address,
        to: &Address,
        method: MinerMethod,
        value: TokenAmount,
        max_fee: TokenAmount,
        params: Vec<u8>,
    ) -> Result<MessageId, BatcherError>;
}
