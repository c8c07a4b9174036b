//! External on-chain oracle (§6), explicitly out of scope per §1: the
//! chain is modeled as reporting channels, settling disputes and
//! confirming finality. No concrete RPC client lives behind this trait;
//! callers supply their own [`ChainAdapter`] implementation.

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::Stream;

use crate::primitives::{Address, AssetId, BlockNumber, TokenAmount};

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ChainError {
    #[error("chain adapter is unavailable: {0}")]
    Unavailable(String),
    #[error("no netting contract {contract} found for asset {asset}")]
    UnknownContract { asset: AssetId, contract: Address },
}

/// `netting_contract_detail` result (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NettingContractDetail {
    pub our_balance: TokenAmount,
    pub partner_address: Address,
    pub partner_balance: TokenAmount,
    pub opened_block: BlockNumber,
    pub settle_timeout: u64,
}

/// Channel opened/closed/settled event stream (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainEvent {
    ChannelOpened { asset_id: AssetId, contract_address: Address, partner: Address },
    ChannelClosed { asset_id: AssetId, contract_address: Address },
    ChannelSettled { asset_id: AssetId, contract_address: Address },
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// All netting contract addresses involving `me` for `asset` (§6).
    async fn netting_addresses_by_asset_participant(
        &self,
        asset: AssetId,
        me: Address,
    ) -> Result<Vec<Address>, ChainError>;

    async fn netting_contract_detail(
        &self,
        asset: AssetId,
        contract: Address,
        me: Address,
    ) -> Result<NettingContractDetail, ChainError>;

    /// All channel endpoint pairs for `asset`, network-wide, for routing
    /// graph construction (§4.2, §6).
    async fn addresses_by_asset(&self, asset: AssetId) -> Result<Vec<(Address, Address)>, ChainError>;

    async fn current_block(&self) -> Result<BlockNumber, ChainError>;

    /// Channel opened/closed/settled events (§6), as a boxed stream so a
    /// subscription-style feed (e.g. a node's block/log subscription) can be
    /// consumed without pinning the adapter to a particular async runtime
    /// primitive.
    fn event_stream(&self) -> Pin<Box<dyn Stream<Item = ChainEvent> + Send>>;
}
