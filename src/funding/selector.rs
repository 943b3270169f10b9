use crate::{chain::ChainApi, Address, BatcherError, MinerInfo, TokenAmount};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Chooses the address a pre-commit message is sent from.
#[async_trait]
pub trait AddressSelector: Send + Sync {
    /// Pick an address holding at least `good_funds`, or failing that, the
    /// richest one holding at least `min_funds`.
    async fn address_for(
        &self,
        api: &dyn ChainApi,
        mi: &MinerInfo,
        good_funds: TokenAmount,
        min_funds: TokenAmount,
    ) -> Result<Address, BatcherError>;
}

/// Selects among control addresses, then the worker, then (unless disabled)
/// the owner, by wallet balance.
#[derive(Debug, Clone, Default)]
pub struct BalanceAddressSelector {
    pub disable_owner_fallback: bool,
}

impl BalanceAddressSelector {
    fn candidates(&self, mi: &MinerInfo) -> Vec<Address> {
        let mut out = mi.control_addresses.clone();
        out.push(mi.worker.clone());
        if !self.disable_owner_fallback {
            out.push(mi.owner.clone());
        }
        out.dedup();
        out
    }
}

#[async_trait]
impl AddressSelector for BalanceAddressSelector {
    async fn address_for(
        &self,
        api: &dyn ChainApi,
        mi: &MinerInfo,
        good_funds: TokenAmount,
        min_funds: TokenAmount,
    ) -> Result<Address, BatcherError> {
        let mut best: Option<(Address, TokenAmount)> = None;

        for addr in self.candidates(mi) {
            let balance = match api.wallet_balance(&addr).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Skipping address {}: {}", addr, e);
                    continue;
                }
            };

            if balance >= good_funds {
                debug!("Selected {} with balance {}", addr, balance);
                return Ok(addr);
            }
            if balance >= min_funds && best.as_ref().is_none_or(|(_, b)| balance > *b) {
                best = Some((addr, balance));
            }
        }

        best.map(|(addr, _)| addr).ok_or_else(|| {
            BatcherError::Funding(format!(
                "no address with at least {} (good {})",
                min_funds, good_funds
            ))
        })
    }
}
