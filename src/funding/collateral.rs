use crate::{
    chain::ChainApi, config::SealingConfig, Address, BatcherError, TokenAmount, TOTAL_SUPPLY,
};

/// Amount of `collateral` the message itself must carry.
///
/// With `collateral_from_miner_balance` the miner's available balance (less
/// the configured buffer) pays first and only the shortfall is sent. With
/// `disable_collateral_fallback` nothing is sent at all.
pub async fn collateral_send_amount(
    api: &dyn ChainApi,
    maddr: &Address,
    cfg: &SealingConfig,
    collateral: TokenAmount,
) -> Result<TokenAmount, BatcherError> {
    if !cfg.collateral_from_miner_balance {
        return Ok(collateral);
    }
    if cfg.disable_collateral_fallback {
        return Ok(0);
    }

    let avail = api.state_miner_available_balance(maddr).await?;
    let avail = avail.saturating_sub(cfg.available_balance_buffer);
    Ok(collateral.saturating_sub(avail))
}

/// Balance snapshot that individually sent pre-commits draw their deposits from.
///
/// Only the miner balance (less buffer) is constrained; otherwise the whole
/// supply is available, which makes every deposit be sent in full.
pub async fn initial_available_balance(
    api: &dyn ChainApi,
    maddr: &Address,
    cfg: &SealingConfig,
) -> Result<TokenAmount, BatcherError> {
    if cfg.collateral_from_miner_balance && !cfg.disable_collateral_fallback {
        let avail = api.state_miner_available_balance(maddr).await?;
        return Ok(avail.saturating_sub(cfg.available_balance_buffer));
    }
    Ok(TOTAL_SUPPLY)
}

/// Draw `deposit` from the running `avail` balance.
///
/// Returns the shortfall that must be sent with the message. `avail` never
/// drops below zero.
pub fn take_from_balance(avail: &mut TokenAmount, deposit: TokenAmount) -> TokenAmount {
    let shortfall = deposit.saturating_sub(*avail);
    *avail = avail.saturating_sub(deposit);
    shortfall
}
