use super::{ChainApi, MessageSender};
use crate::{
    Address, BatcherError, ChainEpoch, MessageId, MinerInfo, MinerMethod, NetworkVersion, TipSet,
    TokenAmount,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// A message accepted by [`MemoryChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub from: Address,
    pub to: Address,
    pub method: MinerMethod,
    pub value: TokenAmount,
    pub max_fee: TokenAmount,
    pub params: Vec<u8>,
}

#[derive(Debug)]
struct ChainState {
    head: TipSet,
    network_version: NetworkVersion,
    miner_info: MinerInfo,
    available_balance: TokenAmount,
    wallets: HashMap<Address, TokenAmount>,
    sent: Vec<SentMessage>,
    send_error: Option<String>,
    query_error: Option<String>,
    send_delay: Duration,
}

/// In-memory chain that records every pushed message.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct MemoryChain {
    state: Arc<Mutex<ChainState>>,
}

impl MemoryChain {
    pub fn new(miner_info: MinerInfo) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                head: TipSet {
                    key: "ts-0".to_string(),
                    height: 0,
                    parent_base_fee: 100,
                },
                network_version: NetworkVersion(16),
                miner_info,
                available_balance: 0,
                wallets: HashMap::new(),
                sent: Vec::new(),
                send_error: None,
                query_error: None,
                send_delay: Duration::ZERO,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // A poisoned lock only means a test panicked mid-update; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_height(&self, height: ChainEpoch) {
        let mut state = self.lock();
        state.head.height = height;
        state.head.key = format!("ts-{height}");
    }

    pub fn set_base_fee(&self, base_fee: TokenAmount) {
        self.lock().head.parent_base_fee = base_fee;
    }

    pub fn set_network_version(&self, nv: NetworkVersion) {
        self.lock().network_version = nv;
    }

    pub fn set_available_balance(&self, balance: TokenAmount) {
        self.lock().available_balance = balance;
    }

    pub fn set_wallet_balance(&self, addr: &Address, balance: TokenAmount) {
        self.lock().wallets.insert(addr.clone(), balance);
    }

    /// Make every subsequent send fail with `error` (or succeed again with `None`).
    pub fn fail_sends(&self, error: Option<&str>) {
        self.lock().send_error = error.map(str::to_string);
    }

    /// Make every subsequent state query fail with `error` (or succeed again with `None`).
    pub fn fail_queries(&self, error: Option<&str>) {
        self.lock().query_error = error.map(str::to_string);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.lock().send_delay = delay;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    fn check_query(&self) -> Result<(), BatcherError> {
        match &self.lock().query_error {
            Some(e) => Err(BatcherError::Query(e.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainApi for MemoryChain {
    async fn chain_head(&self) -> Result<TipSet, BatcherError> {
        self.check_query()?;
        Ok(self.lock().head.clone())
    }

    async fn state_network_version(&self, _tsk: &str) -> Result<NetworkVersion, BatcherError> {
        self.check_query()?;
        Ok(self.lock().network_version)
    }

    async fn state_miner_info(&self, _maddr: &Address) -> Result<MinerInfo, BatcherError> {
        self.check_query()?;
        Ok(self.lock().miner_info.clone())
    }

    async fn state_miner_available_balance(
        &self,
        _maddr: &Address,
    ) -> Result<TokenAmount, BatcherError> {
        self.check_query()?;
        Ok(self.lock().available_balance)
    }

    async fn wallet_balance(&self, addr: &Address) -> Result<TokenAmount, BatcherError> {
        self.check_query()?;
        Ok(self.lock().wallets.get(addr).copied().unwrap_or(0))
    }
}

#[async_trait]
impl MessageSender for MemoryChain {
    async fn send(
        &self,
        from: &Address,
        to: &Address,
        method: MinerMethod,
        value: TokenAmount,
        max_fee: TokenAmount,
        params: Vec<u8>,
    ) -> Result<MessageId, BatcherError> {
        let delay = self.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(e) = &state.send_error {
            return Err(BatcherError::Transport(e.clone()));
        }

        let id = MessageId(format!("bafy-msg-{}", state.sent.len() + 1));
        debug!(
            method = method.number(),
            "Accepted {:?} message {} from {}", method, id, from
        );
        state.sent.push(SentMessage {
            id: id.clone(),
            from: from.clone(),
            to: to.clone(),
            method,
            value,
            max_fee,
            params,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> MemoryChain {
        MemoryChain::new(MinerInfo {
            owner: Address::new("f0100"),
            worker: Address::new("f0101"),
            control_addresses: vec![],
        })
    }

    #[tokio::test]
    async fn test_send_records_messages_in_order() {
        let chain = chain();
        let from = Address::new("f0101");
        let to = Address::new("f01000");
        let a = chain
            .send(&from, &to, MinerMethod::PreCommitSector, 1, 2, vec![1])
            .await
            .unwrap();
        let b = chain
            .send(&from, &to, MinerMethod::PreCommitSectorBatch, 3, 4, vec![2])
            .await
            .unwrap();
        assert_ne!(a, b);
        let sent = chain.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].method, MinerMethod::PreCommitSectorBatch);
        assert_eq!(sent[1].value, 3);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let chain = chain();
        chain.fail_queries(Some("rpc down"));
        assert_eq!(
            chain.chain_head().await,
            Err(BatcherError::Query("rpc down".to_string()))
        );
        chain.fail_queries(None);
        assert!(chain.chain_head().await.is_ok());

        chain.fail_sends(Some("mpool full"));
        let res = chain
            .send(&Address::new("f0101"), &Address::new("f01000"), MinerMethod::PreCommitSector, 0, 0, vec![])
            .await;
        assert_eq!(res, Err(BatcherError::Transport("mpool full".to_string())));
        assert!(chain.sent().is_empty());
    }
}
