//! Funding Module
//!
//! Everything that decides how much a pre-commit message costs and who pays:
//! - `AddressSelector`: picks a sending address able to cover the required funds
//! - `AggregateFeePolicy`: network fee charged for batching N sectors
//! - `collateral_send_amount`: how much collateral the message itself must carry

mod collateral;
mod fees;
mod selector;

pub use collateral::{collateral_send_amount, initial_available_balance, take_from_balance};
pub use fees::{
    AggregateFeePolicy, NetworkAggregateFee, scaled_aggregate_fee, AGG_FEE_DEN, AGG_FEE_NUM,
    BATCH_BALANCER, PRECOMMIT_GAS_ESTIMATE,
};
pub use selector::{AddressSelector, BalanceAddressSelector};
