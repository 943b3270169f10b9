use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amounts in the chain's smallest unit.
pub type TokenAmount = u128;

/// Chain height.
pub type ChainEpoch = i64;

/// Number of a sector within a miner.
pub type SectorNumber = u64;

/// Numeric actor ID.
pub type ActorId = u64;

/// One whole token in its smallest unit.
pub const ONE_TOKEN: TokenAmount = 1_000_000_000_000_000_000;

/// Total token supply, used as the "unbounded" balance snapshot.
pub const TOTAL_SUPPLY: TokenAmount = 2_000_000_000 * ONE_TOKEN;

/// Network protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkVersion(pub u32);

impl NetworkVersion {
    pub const V13: NetworkVersion = NetworkVersion(13);
    pub const V14: NetworkVersion = NetworkVersion(14);
}

/// Chain address, e.g. `f01234` (ID form) or `f3...` (key form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the actor ID if this is an ID address (`f0...` / `t0...`).
    pub fn id(&self) -> Option<ActorId> {
        let rest = self
            .0
            .strip_prefix("f0")
            .or_else(|| self.0.strip_prefix("t0"))?;
        rest.parse().ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a pushed message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Miner actor method numbers used by the batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MinerMethod {
    PreCommitSector,
    PreCommitSectorBatch,
}

impl MinerMethod {
    pub fn number(self) -> u64 {
        match self {
            MinerMethod::PreCommitSector => 6,
            MinerMethod::PreCommitSectorBatch => 25,
        }
    }
}

/// Head of the chain as seen by the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSet {
    pub key: String,
    pub height: ChainEpoch,
    /// Base fee of the lowest-ticket block's parent.
    pub parent_base_fee: TokenAmount,
}

/// Addresses a miner can send messages from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    pub owner: Address,
    pub worker: Address,
    #[serde(default)]
    pub control_addresses: Vec<Address>,
}

/// Deal schedule attached to a piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealInfo {
    pub deal_id: u64,
    pub start_epoch: ChainEpoch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub size: u64,
    pub deal_info: Option<DealInfo>,
}

/// Sealing-pipeline view of a sector, used to derive its pre-commit cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorInfo {
    pub sector_number: SectorNumber,
    pub ticket_epoch: ChainEpoch,
    #[serde(default)]
    pub pieces: Vec<Piece>,
}

/// On-chain pre-commit parameters for one sector. Not inspected by the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorPreCommitInfo {
    pub seal_proof: i64,
    pub sector_number: SectorNumber,
    pub sealed_cid: String,
    pub seal_rand_epoch: ChainEpoch,
    #[serde(default)]
    pub deal_ids: Vec<u64>,
    pub expiration: ChainEpoch,
}

/// Parameters of a batched pre-commit message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreCommitSectorBatchParams {
    pub sectors: Vec<SectorPreCommitInfo>,
}

/// Fully qualified sector identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorId {
    pub miner: ActorId,
    pub number: SectorNumber,
}

/// Outcome of one pre-commit submission attempt.
///
/// `msg` is set on success, `error` on failure. Every sector listed receives
/// the same result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommitBatchRes {
    pub sectors: Vec<SectorNumber>,
    pub msg: Option<MessageId>,
    pub error: Option<String>,
}

impl PreCommitBatchRes {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.msg.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_address_parsing() {
        assert_eq!(Address::new("f01234").id(), Some(1234));
        assert_eq!(Address::new("t0100").id(), Some(100));
        assert_eq!(Address::new("f3abcdef").id(), None);
        assert_eq!(Address::new("f0").id(), None);
    }

    #[test]
    fn test_batch_res_success_requires_msg() {
        let mut res = PreCommitBatchRes {
            sectors: vec![1],
            ..Default::default()
        };
        assert!(!res.is_ok());
        res.msg = Some(MessageId("bafy1".into()));
        assert!(res.is_ok());
        res.error = Some("boom".into());
        assert!(!res.is_ok());
    }
}
