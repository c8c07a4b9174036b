//! Node coordinator (component E, §4.5). Owns the address/key, the
//! `asset_id -> AssetManager` map, the protocol engine, and references to
//! the chain adapter and discovery service (§3). Routes inbound wire
//! messages to the channel and transfer-task layers, and drives the node's
//! own outbound payments.

mod asset_manager;
mod errors;

pub use asset_manager::AssetManager;
pub use errors::NodeError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use slog::Logger;
use tokio::time::sleep;
use tokio_stream::StreamExt;

use crate::chain::{ChainAdapter, ChainEvent};
use crate::channel::{Channel, ChannelEndState, ChannelError, Lock, PreparedMediatedTransfer, Side};
use crate::config::NodeConfig;
use crate::graph::{ChannelGraph, GraphError};
use crate::messages::{DirectTransfer, MediatedTransfer, Message, SecretMessage, SecretRequest};
use crate::primitives::signing::PrivateKey;
use crate::primitives::{Address, AssetId, BlockNumber, Hashlock, Random, Secret, TokenAmount};
use crate::protocol::{DispatchError, Dispatcher, ProtocolEngine, ProtocolError};
use crate::transfer::{InitiatorTask, MediatorTask, Role, TransferEnvironment, TransferError};
use crate::transport::{Discovery, DiscoveryError, Endpoint, Transport};

const REASON_UNKNOWN_ASSET: u16 = 1;
const REASON_UNKNOWN_CHANNEL: u16 = 2;
const REASON_NONCE_MISMATCH: u16 = 3;
const REASON_INSUFFICIENT_BALANCE: u16 = 4;
const REASON_INVALID_LOCKS_ROOT: u16 = 5;
const REASON_UNKNOWN_LOCK: u16 = 6;
const REASON_EXPIRED_LOCK: u16 = 7;
const REASON_CHANNEL_CLOSED: u16 = 8;
const REASON_INVALID_AMOUNT: u16 = 9;
const REASON_OTHER: u16 = 99;

fn channel_error_to_dispatch(err: ChannelError) -> DispatchError {
    let code = match &err {
        ChannelError::NonceMismatch { .. } => REASON_NONCE_MISMATCH,
        ChannelError::InsufficientBalance { .. } => REASON_INSUFFICIENT_BALANCE,
        ChannelError::InvalidLocksRoot { .. } => REASON_INVALID_LOCKS_ROOT,
        ChannelError::UnknownLock(_) => REASON_UNKNOWN_LOCK,
        ChannelError::ExpiredLock { .. } => REASON_EXPIRED_LOCK,
        ChannelError::ChannelClosed => REASON_CHANNEL_CLOSED,
        ChannelError::InvalidAmount => REASON_INVALID_AMOUNT,
        ChannelError::InvalidTimeouts | ChannelError::NoChannel(_) => REASON_OTHER,
    };
    DispatchError::new(code, err.to_string())
}

/// Coordinates every asset's channels, routes inbound wire messages to the
/// channel and transfer-task layers, and drives the node's own payments
/// (§3, §4.5).
pub struct Node {
    address: Address,
    private_key: PrivateKey,
    config: NodeConfig,
    managers: RwLock<HashMap<AssetId, Arc<AssetManager>>>,
    protocol: OnceCell<Arc<ProtocolEngine>>,
    chain: Arc<dyn ChainAdapter>,
    discovery: Arc<dyn Discovery>,
    current_block: AtomicU64,
    random: Mutex<Random>,
    log: Logger,
}

impl Node {
    pub fn new(
        private_key: PrivateKey,
        config: NodeConfig,
        chain: Arc<dyn ChainAdapter>,
        discovery: Arc<dyn Discovery>,
        log: Logger,
    ) -> Arc<Self> {
        let address = private_key.address();
        Arc::new(Self {
            address,
            private_key,
            config,
            managers: RwLock::new(HashMap::new()),
            protocol: OnceCell::new(),
            chain,
            discovery,
            current_block: AtomicU64::new(0),
            random: Mutex::new(Random::new()),
            log,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Wires the protocol engine to `transport` and starts the background
    /// block poller and chain-event listener. A [`Weak`] reference back into
    /// `self` is handed to the dispatcher rather than a strong one, since
    /// the engine outlives for as long as `self` does and a strong cycle
    /// would never be collected (§9 design notes).
    pub fn start(self: Arc<Self>, transport: Arc<dyn Transport>, poll_interval: Duration) {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(NodeDispatcher(Arc::downgrade(&self)));
        let engine = ProtocolEngine::new(
            self.address,
            self.private_key.clone(),
            transport,
            dispatcher,
            self.config.retry.clone(),
            self.config.dedup_lru_capacity,
            self.config.max_pending_per_peer,
            self.log.clone(),
        );
        if self.protocol.set(Arc::new(engine)).is_err() {
            warn!(self.log, "node already started, ignoring duplicate start() call");
            return;
        }

        let poller = Arc::downgrade(&self);
        tokio::spawn(async move {
            loop {
                sleep(poll_interval).await;
                match poller.upgrade() {
                    Some(node) => node.poll_chain().await,
                    None => break,
                }
            }
        });

        let listener = Arc::downgrade(&self);
        let mut events = self.chain.event_stream();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match listener.upgrade() {
                    Some(node) => node.handle_chain_event(event).await,
                    None => break,
                }
            }
        });
    }

    /// Feeds a raw inbound frame to the protocol engine (§4.3).
    pub async fn on_raw(&self, bytes: Vec<u8>) {
        if let Some(engine) = self.protocol.get() {
            engine.on_raw(bytes).await;
        }
    }

    pub async fn announce(&self, host: String, port: u16) -> Result<(), DiscoveryError> {
        self.discovery.register(self.address, host, port).await
    }

    pub async fn locate(&self, address: Address) -> Result<Endpoint, DiscoveryError> {
        self.discovery.lookup(address).await
    }

    pub fn list_assets(&self) -> Vec<AssetId> {
        self.managers.read().keys().copied().collect()
    }

    /// Partners for `asset`, or across every registered asset if `None`
    /// (§4.5).
    pub fn list_partners(&self, asset: Option<AssetId>) -> Vec<Address> {
        let managers = self.managers.read();
        let mut partners: Vec<Address> = match asset {
            Some(asset_id) => managers.get(&asset_id).map(|manager| manager.partners()).unwrap_or_default(),
            None => managers.values().flat_map(|manager| manager.partners()).collect(),
        };
        partners.sort();
        partners.dedup();
        partners
    }

    pub fn has_path(&self, asset: AssetId, target: Address) -> bool {
        self.managers.read().get(&asset).map(|manager| manager.has_path(self.address, target)).unwrap_or(false)
    }

    /// This node's available balance towards `partner` on `asset`'s channel,
    /// or `None` if no such channel is known (§3 invariant).
    pub fn available_balance(&self, asset: AssetId, partner: Address) -> Option<TokenAmount> {
        self.managers.read().get(&asset)?.available_balance(partner)
    }

    /// Registers `asset`'s on-chain channel topology and this node's own
    /// netting contracts with the chain adapter (§6).
    pub async fn register_registry(&self, asset: AssetId) -> Result<(), NodeError> {
        let edges = self.chain.addresses_by_asset(asset).await?;
        let manager = self.get_or_create_manager(asset);
        for (u, v) in edges {
            manager.add_edge(u, v);
            manager.add_edge(v, u);
        }

        let contracts = self.chain.netting_addresses_by_asset_participant(asset, self.address).await?;
        for contract in contracts {
            self.open_channel_from_chain(asset, contract).await?;
        }
        info!(self.log, "asset registered"; "asset" => %asset);
        Ok(())
    }

    fn get_or_create_manager(&self, asset: AssetId) -> Arc<AssetManager> {
        let mut managers = self.managers.write();
        managers.entry(asset).or_insert_with(|| Arc::new(AssetManager::new(asset, ChannelGraph::new()))).clone()
    }

    async fn open_channel_from_chain(&self, asset: AssetId, contract_address: Address) -> Result<(), NodeError> {
        let detail = self.chain.netting_contract_detail(asset, contract_address, self.address).await?;
        let manager = self.get_or_create_manager(asset);
        let our_state = ChannelEndState::new(self.address, detail.our_balance);
        let partner_state = ChannelEndState::new(detail.partner_address, detail.partner_balance);
        let channel =
            Channel::new(asset, contract_address, our_state, partner_state, self.config.reveal_timeout, detail.settle_timeout)?;
        manager.add_channel(channel);
        manager.add_edge(self.address, detail.partner_address);
        manager.add_edge(detail.partner_address, self.address);
        Ok(())
    }

    async fn poll_chain(&self) {
        match self.chain.current_block().await {
            Ok(block) => {
                self.current_block.store(block.0, Ordering::Relaxed);
                let managers: Vec<Arc<AssetManager>> = self.managers.read().values().cloned().collect();
                for manager in managers {
                    for (partner, lock) in manager.expire_locks(block) {
                        debug!(self.log, "lock expired, balance restored"; "partner" => %partner, "hashlock" => ?lock.hashlock);
                    }
                }
            }
            Err(err) => warn!(self.log, "failed to poll current block"; "error" => %err),
        }
    }

    async fn handle_chain_event(&self, event: ChainEvent) {
        match event {
            ChainEvent::ChannelOpened { asset_id, contract_address, .. } => {
                if let Err(err) = self.open_channel_from_chain(asset_id, contract_address).await {
                    warn!(self.log, "failed to register newly opened channel"; "error" => %err);
                }
            }
            ChainEvent::ChannelClosed { asset_id, contract_address } => {
                if let Some(manager) = self.managers.read().get(&asset_id) {
                    manager.close_channel(contract_address);
                }
            }
            ChainEvent::ChannelSettled { asset_id, contract_address } => {
                if let Some(manager) = self.managers.read().get(&asset_id) {
                    manager.settle_channel(contract_address);
                }
            }
        }
    }

    async fn send_message(&self, recipient: Address, message: Message) -> Result<(), ProtocolError> {
        match self.protocol.get() {
            Some(engine) => engine.send(recipient, message).await,
            None => Err(ProtocolError::UnreachablePeer { peer: recipient }),
        }
    }

    /// Sends `amount` of `asset` to `target`. A direct channel partner is
    /// paid with a plain `DirectTransfer` (no lock, no hashlock, no task) —
    /// anything farther away goes through a spawned [`InitiatorTask`], whose
    /// outcome is awaited (§4.5 `transfer`, §8 S1).
    pub async fn transfer(self: &Arc<Self>, asset: AssetId, amount: TokenAmount, target: Address) -> Result<(), NodeError> {
        if amount.is_zero() {
            return Err(NodeError::InvalidAmount);
        }
        let manager = self.managers.read().get(&asset).cloned().ok_or(NodeError::UnknownAsset(asset))?;

        if manager.has_channel(target) {
            return self.transfer_direct(asset, &manager, amount, target).await;
        }

        if !manager.has_path(self.address, target) {
            return Err(GraphError::NoPath { source: self.address, target }.into());
        }

        let secret = self.random.lock().secret();
        let hashlock = secret.hashlock();
        let env: Arc<dyn TransferEnvironment> = self.clone();

        let (task, inbox, completed) = InitiatorTask::new(
            asset,
            self.address,
            target,
            amount,
            secret,
            self.config.settle_timeout,
            self.config.timeout_per_hop,
            self.config.max_paths,
            env,
            self.log.clone(),
        );
        manager.register_task(hashlock, Role::Initiator, inbox);
        tokio::spawn(task.run());

        let outcome = completed.await.map_err(|_| NodeError::Transfer(TransferError::Cancelled))?;
        manager.remove_task(hashlock);
        outcome.map_err(NodeError::Transfer)
    }

    /// Moves `amount` straight across the channel with `target`, skipping
    /// the initiator/mediator machinery entirely for a one-hop payment.
    async fn transfer_direct(&self, asset: AssetId, manager: &Arc<AssetManager>, amount: TokenAmount, target: Address) -> Result<(), NodeError> {
        let prepared = manager
            .create_direct_transfer(target, amount)
            .ok_or(NodeError::UnknownChannel(target))??;

        let message = Message::DirectTransfer(DirectTransfer {
            sender: self.address,
            nonce: prepared.nonce,
            asset,
            recipient: target,
            transferred_amount: prepared.transferred_amount,
            locks_root: prepared.locks_root,
            signature: Vec::new(),
        });
        self.send_message(target, message).await?;
        Ok(())
    }

    /// Validates a request for `target` to pull `amount` of `asset` from
    /// this node. No wire message for a pull payment exists in §6, so this
    /// only checks preconditions and logs the intent; the actual payment
    /// still arrives as an ordinary `transfer` initiated by `target` once
    /// it has been notified out of band (§9 open questions).
    pub async fn request_transfer(&self, asset: AssetId, amount: TokenAmount, target: Address) -> Result<(), NodeError> {
        if amount.is_zero() {
            return Err(NodeError::InvalidAmount);
        }
        if !self.managers.read().contains_key(&asset) {
            return Err(NodeError::UnknownAsset(asset));
        }
        info!(self.log, "pull payment requested"; "asset" => %asset, "amount" => %amount, "target" => %target);
        Ok(())
    }

    pub fn close_channel(&self, _asset: AssetId, _partner: Address) -> Result<(), NodeError> {
        Err(NodeError::Unsupported { operation: "close_channel" })
    }

    pub fn open_channel(&self, _asset: AssetId, _partner: Address, _balance: TokenAmount) -> Result<(), NodeError> {
        Err(NodeError::Unsupported { operation: "open_channel" })
    }

    pub fn exchange(&self, _offered: AssetId, _wanted: AssetId, _target: Address) -> Result<(), NodeError> {
        Err(NodeError::Unsupported { operation: "exchange" })
    }

    /// Dispatches one verified, deduplicated inbound message by kind
    /// (§4.3 step 4, §7).
    async fn dispatch(self: Arc<Self>, message: Message) -> Result<(), DispatchError> {
        match message {
            Message::Ping(_) | Message::Ack(_) | Message::RejectTransfer(_) => Ok(()),
            Message::DirectTransfer(direct) => self.on_direct_transfer(direct),
            Message::MediatedTransfer(mediated) => self.on_mediated_transfer(mediated).await,
            Message::SecretRequest(request) => {
                self.forward_to_task(request.hashlock, Message::SecretRequest(request));
                Ok(())
            }
            Message::Secret(secret_message) => self.on_secret(secret_message).await,
            Message::TransferTimeout(timeout) => {
                self.forward_to_task(timeout.hashlock, Message::TransferTimeout(timeout));
                Ok(())
            }
            Message::CancelTransfer(cancel) => {
                self.forward_to_task(cancel.hashlock, Message::CancelTransfer(cancel));
                Ok(())
            }
        }
    }

    fn manager_for_asset(&self, asset: AssetId) -> Result<Arc<AssetManager>, DispatchError> {
        self.managers
            .read()
            .get(&asset)
            .cloned()
            .ok_or_else(|| DispatchError::new(REASON_UNKNOWN_ASSET, "asset not registered"))
    }

    fn on_direct_transfer(&self, message: DirectTransfer) -> Result<(), DispatchError> {
        let manager = self.manager_for_asset(message.asset)?;
        let current_block = self.current_block();
        manager
            .register_transfer(message.sender, Side::Partner, message.nonce, message.transferred_amount, message.locks_root, None, current_block)
            .ok_or_else(|| DispatchError::new(REASON_UNKNOWN_CHANNEL, "no channel with sender"))?
            .map_err(channel_error_to_dispatch)
    }

    /// Registers the incoming lock against the channel with `message.sender`
    /// and, if this node is the target, requests the secret straight from
    /// the initiator; otherwise spawns a [`MediatorTask`] to forward it on
    /// (§4.4).
    async fn on_mediated_transfer(self: Arc<Self>, message: MediatedTransfer) -> Result<(), DispatchError> {
        let manager = self.manager_for_asset(message.asset)?;
        let current_block = self.current_block();
        let incoming_lock = Lock { amount: message.lock.amount, expiration: message.lock.expiration, hashlock: message.lock.hashlock };
        manager
            .register_transfer(
                message.sender,
                Side::Partner,
                message.nonce,
                message.transferred_amount,
                message.locks_root,
                Some(incoming_lock),
                current_block,
            )
            .ok_or_else(|| DispatchError::new(REASON_UNKNOWN_CHANNEL, "no channel with sender"))?
            .map_err(channel_error_to_dispatch)?;

        if message.target == self.address {
            let request = SecretRequest { sender: self.address, hashlock: message.lock.hashlock, signature: Vec::new() };
            if let Err(err) = self.send_message(message.initiator, Message::SecretRequest(request)).await {
                warn!(self.log, "failed to send secret request to initiator"; "error" => %err);
            }
            return Ok(());
        }

        if !manager.has_task(message.lock.hashlock) {
            self.spawn_mediator(manager, message);
        }
        Ok(())
    }

    fn spawn_mediator(self: Arc<Self>, manager: Arc<AssetManager>, message: MediatedTransfer) {
        let env: Arc<dyn TransferEnvironment> = self.clone();
        let (task, inbox, _completed) = MediatorTask::new(
            message.asset,
            self.address,
            message.sender,
            message.target,
            message.initiator,
            message.lock.amount,
            message.lock.hashlock,
            message.lock.expiration,
            message.fee,
            self.config.reveal_timeout,
            self.config.timeout_per_hop,
            self.config.max_paths,
            env,
            self.log.clone(),
        );
        let hashlock = message.lock.hashlock;
        manager.register_task(hashlock, Role::Mediator, inbox);
        tokio::spawn(async move {
            task.run().await;
            manager.remove_task(hashlock);
        });
    }

    /// `Secret` serves two purposes at once: it is forwarded to whichever
    /// task of this node's own is waiting on this hashlock, *and* applied to
    /// settle the channel in every asset manager that holds a channel with
    /// the message's sender (§4.1, §4.5).
    async fn on_secret(&self, message: SecretMessage) -> Result<(), DispatchError> {
        self.forward_to_task(message.secret.hashlock(), Message::Secret(message.clone()));

        let managers: Vec<Arc<AssetManager>> = self.managers.read().values().cloned().collect();
        for manager in managers {
            if manager.has_channel(message.sender) {
                manager.register_secret(message.sender, message.secret);
            }
        }
        Ok(())
    }

    fn forward_to_task(&self, hashlock: Hashlock, message: Message) -> bool {
        let managers: Vec<Arc<AssetManager>> = self.managers.read().values().cloned().collect();
        for manager in managers {
            if let Some(inbox) = manager.task_inbox(hashlock) {
                let _ = inbox.send(message);
                return true;
            }
        }
        debug!(self.log, "no task found for hashlock, dropping"; "hashlock" => ?hashlock);
        false
    }
}

/// Wraps a [`Weak`] reference to the coordinator so the protocol engine can
/// hold a [`Dispatcher`] without creating an `Arc` reference cycle with the
/// `Node` that owns the engine (§9 design notes).
struct NodeDispatcher(Weak<Node>);

#[async_trait]
impl Dispatcher for NodeDispatcher {
    async fn dispatch(&self, message: Message) -> Result<(), DispatchError> {
        match self.0.upgrade() {
            Some(node) => node.dispatch(message).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TransferEnvironment for Node {
    async fn send(&self, recipient: Address, message: Message) -> Result<(), ProtocolError> {
        self.send_message(recipient, message).await
    }

    fn current_block(&self) -> BlockNumber {
        BlockNumber(self.current_block.load(Ordering::Relaxed))
    }

    fn candidate_paths(&self, asset: AssetId, source: Address, target: Address, k: usize) -> Vec<Vec<Address>> {
        self.managers.read().get(&asset).map(|manager| manager.candidate_paths(source, target, k)).unwrap_or_default()
    }

    fn create_mediated_transfer(
        &self,
        asset: AssetId,
        partner: Address,
        amount: TokenAmount,
        hashlock: Hashlock,
        expiration: BlockNumber,
        target: Address,
        initiator: Address,
        fee: TokenAmount,
    ) -> Result<PreparedMediatedTransfer, ChannelError> {
        let current_block = self.current_block();
        let manager = self.managers.read().get(&asset).cloned().ok_or(ChannelError::NoChannel(partner))?;
        manager
            .create_mediated_transfer(partner, amount, hashlock, expiration, target, initiator, fee, current_block)
            .ok_or(ChannelError::NoChannel(partner))?
    }

    fn register_secret(&self, asset: AssetId, partner: Address, secret: Secret) -> bool {
        self.managers.read().get(&asset).map(|manager| manager.register_secret(partner, secret)).unwrap_or(false)
    }
}
