//! Per-asset channel bookkeeping: the partner-keyed channel map, the
//! per-asset routing graph, and the hashlock-keyed table of in-flight
//! transfer tasks (§3 `AssetManager`, §4.4, §4.5).

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelError, PreparedDirectTransfer, PreparedMediatedTransfer, Side};
use crate::graph::ChannelGraph;
use crate::messages::Message;
use crate::primitives::{Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};
use crate::transfer::Role;

struct TaskEntry {
    role: Role,
    inbox: mpsc::UnboundedSender<Message>,
}

/// One asset's channel set plus its routing graph and in-flight transfer
/// tasks (§4.4, §4.5).
pub struct AssetManager {
    asset_id: AssetId,
    channels: Mutex<HashMap<Address, Channel>>,
    graph: Mutex<ChannelGraph>,
    tasks: Mutex<HashMap<Hashlock, TaskEntry>>,
}

impl AssetManager {
    pub fn new(asset_id: AssetId, graph: ChannelGraph) -> Self {
        Self {
            asset_id,
            channels: Mutex::new(HashMap::new()),
            graph: Mutex::new(graph),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn add_channel(&self, channel: Channel) {
        let partner = channel.partner_state.address;
        self.channels.lock().insert(partner, channel);
    }

    pub fn partners(&self) -> Vec<Address> {
        self.channels.lock().keys().copied().collect()
    }

    pub fn has_channel(&self, partner: Address) -> bool {
        self.channels.lock().contains_key(&partner)
    }

    fn with_channel<R>(&self, partner: Address, f: impl FnOnce(&mut Channel) -> R) -> Option<R> {
        self.channels.lock().get_mut(&partner).map(f)
    }

    pub fn available_balance(&self, partner: Address) -> Option<TokenAmount> {
        self.with_channel(partner, |channel| channel.available_balance(Side::Ours))
    }

    pub fn create_direct_transfer(&self, partner: Address, amount: TokenAmount) -> Option<Result<PreparedDirectTransfer, ChannelError>> {
        self.with_channel(partner, |channel| channel.create_direct_transfer(amount))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_mediated_transfer(
        &self,
        partner: Address,
        amount: TokenAmount,
        hashlock: Hashlock,
        expiration: BlockNumber,
        target: Address,
        initiator: Address,
        fee: TokenAmount,
        current_block: BlockNumber,
    ) -> Option<Result<PreparedMediatedTransfer, ChannelError>> {
        self.with_channel(partner, |channel| {
            channel.create_mediated_transfer(amount, hashlock, expiration, target, initiator, fee, current_block)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_transfer(
        &self,
        partner: Address,
        side: Side,
        nonce: u64,
        transferred_amount: TokenAmount,
        locks_root: [u8; 32],
        new_lock: Option<crate::channel::Lock>,
        current_block: BlockNumber,
    ) -> Option<Result<(), ChannelError>> {
        self.with_channel(partner, |channel| {
            channel.register_transfer(side, nonce, transferred_amount, locks_root, new_lock, current_block)
        })
    }

    /// Settles `secret` against the channel with `partner`, if any pending
    /// lock matches (§4.1, idempotent).
    pub fn register_secret(&self, partner: Address, secret: Secret) -> bool {
        self.with_channel(partner, |channel| channel.register_secret(secret)).unwrap_or(false)
    }

    /// Sweeps every channel for locks past their expiration (§3, §4.1).
    pub fn expire_locks(&self, current_block: BlockNumber) -> Vec<(Address, crate::channel::Lock)> {
        let mut expired = Vec::new();
        for (partner, channel) in self.channels.lock().iter_mut() {
            for lock in channel.expire_locks(current_block) {
                expired.push((*partner, lock));
            }
        }
        expired
    }

    pub fn candidate_paths(&self, source: Address, target: Address, k: usize) -> Vec<Vec<Address>> {
        self.graph.lock().shortest_paths(source, target, k)
    }

    pub fn has_path(&self, source: Address, target: Address) -> bool {
        self.graph.lock().has_path(source, target)
    }

    pub fn add_edge(&self, u: Address, v: Address) {
        self.graph.lock().add_edge(u, v);
    }

    pub fn has_task(&self, hashlock: Hashlock) -> bool {
        self.tasks.lock().contains_key(&hashlock)
    }

    pub fn register_task(&self, hashlock: Hashlock, role: Role, inbox: mpsc::UnboundedSender<Message>) {
        self.tasks.lock().insert(hashlock, TaskEntry { role, inbox });
    }

    pub fn task_inbox(&self, hashlock: Hashlock) -> Option<mpsc::UnboundedSender<Message>> {
        self.tasks.lock().get(&hashlock).map(|entry| entry.inbox.clone())
    }

    pub fn task_role(&self, hashlock: Hashlock) -> Option<Role> {
        self.tasks.lock().get(&hashlock).map(|entry| entry.role)
    }

    /// Drains a completed task's entry (§4.4: "a hashlock→task mapping must
    /// be drained on task termination").
    pub fn remove_task(&self, hashlock: Hashlock) {
        self.tasks.lock().remove(&hashlock);
    }

    /// Marks the channel anchored by `contract_address` closed, if known.
    pub fn close_channel(&self, contract_address: Address) {
        if let Some(channel) = self.channels.lock().values_mut().find(|c| c.contract_address == contract_address) {
            channel.close();
        }
    }

    /// Marks the channel anchored by `contract_address` settled, if known.
    pub fn settle_channel(&self, contract_address: Address) {
        if let Some(channel) = self.channels.lock().values_mut().find(|c| c.contract_address == contract_address) {
            channel.settle();
        }
    }
}
