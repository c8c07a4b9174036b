//! Per-payment transfer tasks (component D, §4.4): one task per payment per
//! node's involvement, in one of two roles. Each task drives a single
//! `tokio::time::sleep` deadline per hop rather than polling, per §9's
//! "cooperative tasks across suspensions" redesign flag.

mod errors;
pub mod initiator;
pub mod mediator;

pub use errors::TransferError;
pub use initiator::InitiatorTask;
pub use mediator::MediatorTask;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::channel::{ChannelError, PreparedMediatedTransfer};
use crate::messages::Message;
use crate::primitives::{Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};
use crate::protocol::ProtocolError;

/// This node's involvement in a payment (§4.4). The target is handled
/// inline by the coordinator and never gets a task of its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Initiator,
    Mediator,
}

/// The coordinator capability a task needs, injected so a task never holds a
/// channel or graph reference directly — it re-resolves both by `(asset,
/// partner)` on every touch (§9 design notes: "avoid cyclic ownership...
/// the task keeps a weak/identifier reference to the channel").
#[async_trait]
pub trait TransferEnvironment: Send + Sync {
    async fn send(&self, recipient: Address, message: Message) -> Result<(), ProtocolError>;

    fn current_block(&self) -> BlockNumber;

    /// Up to `k` simple paths `source -> target` for `asset`, shortest first
    /// (§4.2). Empty if the graph has none.
    fn candidate_paths(&self, asset: AssetId, source: Address, target: Address, k: usize) -> Vec<Vec<Address>>;

    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<PreparedMediatedTransfer, ChannelError>;

    /// Applies `secret` to the channel with `partner`, if a matching pending
    /// lock exists. Idempotent (§4.1, §8).
    fn register_secret(&self, asset: AssetId, partner: Address, secret: Secret) -> bool;
}

/// Delivered to whoever is awaiting a task's completion (§4.5 `transfer`).
pub type Outcome = Result<(), TransferError>;

/// `oneshot`-based completion notifier handed to whoever awaits the payment.
pub struct Completion {
    sender: Option<oneshot::Sender<Outcome>>,
}

impl Completion {
    pub fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender: Some(sender) }, receiver)
    }

    pub fn complete(&mut self, outcome: Outcome) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(outcome);
        }
    }
}

/// Unique task key: at most one task per hashlock per node (§4.4 invariants).
pub type TaskKey = Hashlock;
