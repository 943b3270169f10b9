use crate::{BatcherError, NetworkVersion, TokenAmount};

/// Gas a single pre-commit is estimated to use when aggregated.
pub const PRECOMMIT_GAS_ESTIMATE: TokenAmount = 16_433_324;

/// Floor applied to the base fee when pricing a batch (5 nanoFIL).
pub const BATCH_BALANCER: TokenAmount = 5_000_000_000;

const BATCH_DISCOUNT_NUM: TokenAmount = 1;
const BATCH_DISCOUNT_DEN: TokenAmount = 20;

/// Headroom added on top of the network fee so base fee movement between
/// estimation and inclusion does not fail the message.
pub const AGG_FEE_NUM: TokenAmount = 110;
pub const AGG_FEE_DEN: TokenAmount = 100;

/// Network fee charged for aggregating pre-commits.
pub trait AggregateFeePolicy: Send + Sync {
    fn aggregate_precommit_network_fee(
        &self,
        nv: NetworkVersion,
        sectors: usize,
        base_fee: TokenAmount,
    ) -> Result<TokenAmount, BatcherError>;
}

/// Batch fee as charged by the miner actor since network version 13:
/// `sectors * gas * max(base_fee, balancer) * discount`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkAggregateFee;

impl AggregateFeePolicy for NetworkAggregateFee {
    fn aggregate_precommit_network_fee(
        &self,
        nv: NetworkVersion,
        sectors: usize,
        base_fee: TokenAmount,
    ) -> Result<TokenAmount, BatcherError> {
        if nv < NetworkVersion::V13 {
            return Err(BatcherError::Fee(format!(
                "network version {} does not support batched pre-commits",
                nv.0
            )));
        }
        if sectors == 0 {
            return Err(BatcherError::Fee("cannot price an empty batch".to_string()));
        }

        let effective_fee = base_fee.max(BATCH_BALANCER);
        let gas = PRECOMMIT_GAS_ESTIMATE.saturating_mul(sectors as TokenAmount);
        Ok(effective_fee
            .saturating_mul(gas)
            .saturating_mul(BATCH_DISCOUNT_NUM)
            / BATCH_DISCOUNT_DEN)
    }
}

/// Network fee with [`AGG_FEE_NUM`]/[`AGG_FEE_DEN`] headroom applied.
pub fn scaled_aggregate_fee(raw: TokenAmount) -> TokenAmount {
    raw.saturating_mul(AGG_FEE_NUM) / AGG_FEE_DEN
}
