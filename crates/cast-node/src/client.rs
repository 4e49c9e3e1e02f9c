//! Alloy WebSocket session to one execution node.
//!
//! One supervisor task owns the raw transport. It multiplexes the
//! `newPendingTransactions` and `newHeads` subscriptions onto a single
//! bounded event channel and handles reconnects: on transport failure the
//! session is torn down and reopened after a 5-second delay, doubling to
//! 10 seconds on repeated failure. A `Resync` event is emitted before any
//! post-reconnect event so consumers can clear stream-derived state.
//!
//! On-demand calls (`fetch_tx`, `fetch_block`, token metadata reads) go
//! through whatever provider is currently live and fail with
//! [`NodeError::Disconnected`] mid-reconnect.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::network::{Ethereum, TransactionResponse};
use alloy::primitives::{Address, Bytes, TxKind, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::pubsub::SubscriptionStream;
use alloy::rpc::types::eth::{
    Block as RpcBlock, BlockNumberOrTag, Header as RpcHeader, Transaction as RpcTransaction,
    TransactionInput, TransactionRequest,
};
use alloy::transports::ws::WsConnect;
use eyre::{Context, Result};
use futures::StreamExt;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::timeout;

use cast_data::types::{unix_ms_now, BlockHead, PendingTx, TxStatus};

use crate::error::NodeError;

type WsProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider<Ethereum>,
>;

const EVENT_CHANNEL_CAPACITY: usize = 4096;
const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// ERC-20 `symbol()`.
const SELECTOR_SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
/// ERC-20 `decimals()`.
const SELECTOR_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

/// Event delivered by the node session, ordered per stream.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// A hash appeared on the pending-transactions stream.
    PendingTx(B256),
    /// A new canonical head arrived (no transaction hashes attached).
    Head(BlockHead),
    /// The session reconnected; all stream-derived state must be cleared
    /// before processing any later event.
    Resync,
}

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Live,
    Reconnecting,
}

/// ERC-20 metadata read on demand for annotation enrichment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

/// A block fetched on demand, with bodies when requested.
#[derive(Clone, Debug)]
pub struct FetchedBlock {
    pub head: BlockHead,
    /// Full transactions, empty when fetched hashes-only.
    pub transactions: Vec<PendingTx>,
}

struct Session {
    url: String,
    provider: RwLock<Option<Arc<WsProvider>>>,
    state: Mutex<SessionState>,
    reconnect: Notify,
}

impl Session {
    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, provider: Arc<WsProvider>) {
        *self
            .provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    fn clear_provider(&self) {
        *self
            .provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current_provider(&self) -> Result<Arc<WsProvider>, NodeError> {
        self.provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NodeError::Disconnected)
    }

    async fn establish(
        url: &str,
    ) -> Result<
        (
            Arc<WsProvider>,
            SubscriptionStream<B256>,
            SubscriptionStream<RpcHeader>,
        ),
        NodeError,
    > {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(url))
            .await
            .map_err(NodeError::classify)?;
        let provider = Arc::new(provider);

        let pending = timeout(SUBSCRIBE_TIMEOUT, async {
            provider.subscribe_pending_transactions().await
        })
        .await
        .map_err(|_| NodeError::Timeout(SUBSCRIBE_TIMEOUT))?
        .map_err(NodeError::classify)?
        .into_stream();
        let heads = timeout(SUBSCRIBE_TIMEOUT, async { provider.subscribe_blocks().await })
            .await
            .map_err(|_| NodeError::Timeout(SUBSCRIBE_TIMEOUT))?
            .map_err(NodeError::classify)?
            .into_stream();

        Ok((provider, pending, heads))
    }
}

/// Handle to the single logical node session.
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<Session>,
}

impl NodeClient {
    /// Opens the session and both subscriptions, returning the client and
    /// the multiplexed event receiver. Fails fast if the endpoint is
    /// unreachable; later failures are handled by the reconnect loop.
    ///
    /// # Errors
    /// Returns error if the initial connection or subscriptions fail.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub async fn connect(
        url: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, mpsc::Receiver<NodeEvent>)> {
        let session = Arc::new(Session {
            url: url.to_string(),
            provider: RwLock::new(None),
            state: Mutex::new(SessionState::Connecting),
            reconnect: Notify::new(),
        });

        let (provider, pending, heads) = Session::establish(url)
            .await
            .wrap_err_with(|| format!("failed to open node session at {url}"))?;
        session.install(provider);
        tracing::info!("node session established");

        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(supervise(session.clone(), events, shutdown, pending, heads));

        Ok((Self { inner: session }, receiver))
    }

    /// Current state of the session state machine.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Requests a session teardown and reconnect. A second request while a
    /// reconnect is already in progress is a no-op.
    pub fn trigger_reconnect(&self) {
        if self.inner.state() == SessionState::Live {
            self.inner.reconnect.notify_one();
        }
    }

    /// `eth_getTransactionByHash`, mapped into the domain type.
    ///
    /// # Errors
    /// `Disconnected` mid-reconnect, `Timeout` past the per-RPC budget,
    /// `RateLimited` on a throttling response.
    pub async fn fetch_tx(&self, hash: B256) -> Result<Option<PendingTx>, NodeError> {
        let provider = self.inner.current_provider()?;
        let tx = timeout(RPC_TIMEOUT, async {
            provider.get_transaction_by_hash(hash).await
        })
        .await
        .map_err(|_| NodeError::Timeout(RPC_TIMEOUT))?
        .map_err(NodeError::classify)?;
        Ok(tx.map(map_transaction))
    }

    /// `eth_getBlockByNumber`, with bodies when `full`.
    ///
    /// # Errors
    /// Same taxonomy as [`NodeClient::fetch_tx`].
    pub async fn fetch_block(
        &self,
        number: u64,
        full: bool,
    ) -> Result<Option<FetchedBlock>, NodeError> {
        let provider = self.inner.current_provider()?;
        let block = timeout(RPC_TIMEOUT, async {
            let call = provider.get_block_by_number(BlockNumberOrTag::Number(number));
            if full {
                call.full().await
            } else {
                call.await
            }
        })
        .await
        .map_err(|_| NodeError::Timeout(RPC_TIMEOUT))?
        .map_err(NodeError::classify)?;
        Ok(block.map(map_block))
    }

    /// Reads `symbol()` and `decimals()` from an ERC-20 contract. Returns
    /// `None` when the contract does not answer both calls with decodable
    /// values.
    ///
    /// # Errors
    /// Same taxonomy as [`NodeClient::fetch_tx`].
    pub async fn fetch_token_metadata(
        &self,
        token: Address,
    ) -> Result<Option<TokenMetadata>, NodeError> {
        let symbol_raw = self.eth_call(token, SELECTOR_SYMBOL).await?;
        let decimals_raw = self.eth_call(token, SELECTOR_DECIMALS).await?;
        let symbol = match decode_abi_string(&symbol_raw) {
            Some(symbol) if !symbol.is_empty() => symbol,
            _ => return Ok(None),
        };
        let Some(decimals) = decode_abi_u8(&decimals_raw) else {
            return Ok(None);
        };
        Ok(Some(TokenMetadata { symbol, decimals }))
    }

    async fn eth_call(&self, to: Address, selector: [u8; 4]) -> Result<Bytes, NodeError> {
        let provider = self.inner.current_provider()?;
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(Bytes::from(selector.to_vec())),
            ..Default::default()
        };
        timeout(RPC_TIMEOUT, async { provider.call(request).await })
            .await
            .map_err(|_| NodeError::Timeout(RPC_TIMEOUT))?
            .map_err(NodeError::classify)
    }
}

async fn supervise(
    session: Arc<Session>,
    events: mpsc::Sender<NodeEvent>,
    mut shutdown: watch::Receiver<bool>,
    pending: SubscriptionStream<B256>,
    heads: SubscriptionStream<RpcHeader>,
) {
    let mut streams = Some((pending, heads));
    let mut delay = INITIAL_RECONNECT_DELAY;
    let mut first = true;

    loop {
        if *shutdown.borrow() {
            break;
        }

        if let Some((pending, heads)) = streams.take() {
            if !first && events.send(NodeEvent::Resync).await.is_err() {
                break;
            }
            first = false;
            session.set_state(SessionState::Live);
            delay = INITIAL_RECONNECT_DELAY;

            run_streams(&session, &events, &mut shutdown, pending, heads).await;
            if *shutdown.borrow() {
                break;
            }

            // Transport-fatal: unregister listeners, tear the session down.
            session.set_state(SessionState::Reconnecting);
            session.clear_provider();
            tracing::warn!(delay_s = delay.as_secs(), "node session lost, reconnecting");
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }

        session.set_state(SessionState::Connecting);
        match Session::establish(&session.url).await {
            Ok((provider, pending, heads)) => {
                session.install(provider);
                tracing::info!("node session re-established");
                streams = Some((pending, heads));
            }
            Err(err) => {
                delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                tracing::warn!(%err, retry_s = delay.as_secs(), "reconnect attempt failed");
            }
        }
    }

    session.clear_provider();
    session.set_state(SessionState::Disconnected);
    tracing::info!("node session closed");
}

/// Forwards stream items until the transport fails, a reconnect is
/// requested, or shutdown is observed.
async fn run_streams(
    session: &Session,
    events: &mpsc::Sender<NodeEvent>,
    shutdown: &mut watch::Receiver<bool>,
    mut pending: SubscriptionStream<B256>,
    mut heads: SubscriptionStream<RpcHeader>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = session.reconnect.notified() => {
                tracing::info!("reconnect requested by caller");
                return;
            }
            item = pending.next() => {
                let Some(hash) = item else {
                    tracing::warn!("pending-transactions stream ended");
                    return;
                };
                if events.send(NodeEvent::PendingTx(hash)).await.is_err() {
                    return;
                }
            }
            item = heads.next() => {
                let Some(header) = item else {
                    tracing::warn!("new-heads stream ended");
                    return;
                };
                if events.send(NodeEvent::Head(map_header(&header))).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn map_header(header: &RpcHeader) -> BlockHead {
    BlockHead {
        number: header.number,
        hash: header.hash,
        parent_hash: header.parent_hash,
        timestamp: header.timestamp,
        miner: header.beneficiary,
        extra_data: header.extra_data.clone(),
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        base_fee_per_gas: header.base_fee_per_gas.map(u128::from),
        transaction_hashes: Vec::new(),
    }
}

fn map_block(block: RpcBlock) -> FetchedBlock {
    let hashes: Vec<B256> = block.transactions.hashes().collect();
    let head = BlockHead {
        number: block.header.number,
        hash: block.header.hash,
        parent_hash: block.header.parent_hash,
        timestamp: block.header.timestamp,
        miner: block.header.beneficiary,
        extra_data: block.header.extra_data.clone(),
        gas_limit: block.header.gas_limit,
        gas_used: block.header.gas_used,
        base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from),
        transaction_hashes: hashes,
    };
    let transactions = block
        .transactions
        .into_transactions()
        .map(map_transaction)
        .collect();
    FetchedBlock { head, transactions }
}

fn map_transaction(tx: RpcTransaction) -> PendingTx {
    let gas_price = alloy::consensus::Transaction::gas_price(&tx);
    let (max_fee_per_gas, max_priority_fee_per_gas) = if gas_price.is_some() {
        (None, None)
    } else {
        (
            Some(alloy::consensus::Transaction::max_fee_per_gas(&tx)),
            tx.max_priority_fee_per_gas(),
        )
    };
    PendingTx {
        hash: tx.tx_hash(),
        from: tx.from(),
        to: tx.to(),
        value: tx.value(),
        gas_limit: tx.gas_limit(),
        nonce: Some(tx.nonce()),
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        input: tx.input().clone(),
        first_seen_ms: unix_ms_now(),
        status: TxStatus::Pending,
    }
}

/// Decodes an ABI-encoded `string` return, tolerating the bytes32 form
/// some older tokens use.
fn decode_abi_string(data: &[u8]) -> Option<String> {
    if data.len() >= 64 {
        let len_word = &data[32..64];
        let len = u64::from_be_bytes(len_word[24..32].try_into().ok()?) as usize;
        if data.len() >= 64 + len {
            return String::from_utf8(data[64..64 + len].to_vec()).ok();
        }
    }
    if data.len() == 32 {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        return String::from_utf8(trimmed).ok();
    }
    None
}

fn decode_abi_u8(data: &[u8]) -> Option<u8> {
    if data.len() < 32 {
        return None;
    }
    // uint8 occupies the low byte of the first word.
    if data[..31].iter().any(|b| *b != 0) {
        return None;
    }
    Some(data[31])
}
