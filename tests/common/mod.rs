//! Shared scaffolding for the multi-node scenario tests (§8): an in-memory
//! [`Network`] that wires several real [`Node`]s together over a
//! [`MeshTransport`], plus a [`ScenarioChain`] test double standing in for
//! the chain adapter.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use slog::{o, Logger};
use tokio_stream::Stream;

use lockmesh::chain::{ChainAdapter, ChainError, ChainEvent, NettingContractDetail};
use lockmesh::config::{NodeConfig, RetryConfig};
use lockmesh::messages::Message;
use lockmesh::node::Node;
use lockmesh::primitives::signing::PrivateKey;
use lockmesh::primitives::{Address, AssetId, BlockNumber, TokenAmount};
use lockmesh::transport::{Discovery, DiscoveryError, Endpoint, Transport, TransportError};

pub fn key(byte: u8) -> PrivateKey {
    PrivateKey::new(secp256k1::SecretKey::from_slice(&[byte; 32]).unwrap())
}

pub fn addr(byte: u8) -> Address {
    Address::from([byte; 20])
}

pub fn contract(byte: u8) -> Address {
    Address::from([200 + byte; 20])
}

pub fn asset() -> AssetId {
    AssetId::from([9u8; 20])
}

pub fn test_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = StdMutex::new(drain).fuse();
    Logger::root(drain, o!())
}

/// Short timeouts and retry intervals so scenarios settle in well under a
/// second of wall-clock time.
pub fn fast_config() -> NodeConfig {
    NodeConfig {
        reveal_timeout: 3,
        settle_timeout: 30,
        retry: RetryConfig {
            base_delay: Duration::from_millis(5),
            backoff_factor: 2,
            max_delay: Duration::from_millis(40),
            max_retries: 5,
        },
        dedup_lru_capacity: 1024,
        max_pending_per_peer: 32,
        max_paths: 4,
        timeout_per_hop: Duration::from_millis(80),
    }
}

#[derive(Clone, Copy)]
pub struct ChannelSpec {
    pub contract: Address,
    pub partner: Address,
    pub our_balance: TokenAmount,
    pub partner_balance: TokenAmount,
}

/// Reports a fixed, externally-driven block height plus a node's own slice
/// of the network-wide channel topology (§6).
pub struct ScenarioChain {
    edges: Vec<(Address, Address)>,
    channels: Vec<ChannelSpec>,
    clock: Arc<AtomicU64>,
}

impl ScenarioChain {
    pub fn new(edges: Vec<(Address, Address)>, channels: Vec<ChannelSpec>, clock: Arc<AtomicU64>) -> Self {
        Self { edges, channels, clock }
    }
}

#[async_trait]
impl ChainAdapter for ScenarioChain {
    async fn netting_addresses_by_asset_participant(&self, _asset: AssetId, _me: Address) -> Result<Vec<Address>, ChainError> {
        Ok(self.channels.iter().map(|c| c.contract).collect())
    }

    async fn netting_contract_detail(&self, _asset: AssetId, contract: Address, _me: Address) -> Result<NettingContractDetail, ChainError> {
        let spec = self.channels.iter().find(|c| c.contract == contract).expect("test only asks about its own contracts");
        Ok(NettingContractDetail {
            our_balance: spec.our_balance,
            partner_address: spec.partner,
            partner_balance: spec.partner_balance,
            opened_block: BlockNumber(1),
            settle_timeout: 30,
        })
    }

    async fn addresses_by_asset(&self, _asset: AssetId) -> Result<Vec<(Address, Address)>, ChainError> {
        Ok(self.edges.clone())
    }

    async fn current_block(&self) -> Result<BlockNumber, ChainError> {
        Ok(BlockNumber(self.clock.load(Ordering::Relaxed)))
    }

    fn event_stream(&self) -> Pin<Box<dyn Stream<Item = ChainEvent> + Send>> {
        Box::pin(tokio_stream::empty())
    }
}

pub struct NullDiscovery;

#[async_trait]
impl Discovery for NullDiscovery {
    async fn register(&self, _address: Address, _host: String, _port: u16) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn lookup(&self, address: Address) -> Result<Endpoint, DiscoveryError> {
        Err(DiscoveryError::NotRegistered(address))
    }
}

/// Routes signed wire frames between registered nodes by address.
pub struct Network {
    nodes: StdMutex<HashMap<Address, Arc<Node>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { nodes: StdMutex::new(HashMap::new()) })
    }

    pub fn register(&self, node: Arc<Node>) {
        self.nodes.lock().unwrap().insert(node.address(), node);
    }

    fn get(&self, address: Address) -> Option<Arc<Node>> {
        self.nodes.lock().unwrap().get(&address).cloned()
    }
}

/// Lets a scenario drop a node's outbound messages of a particular shape
/// (§8 S3: a target that never asks for the secret).
pub type Filter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

pub fn allow_all() -> Filter {
    Arc::new(|_| true)
}

#[derive(Clone)]
pub struct WireTrace {
    pub from: Address,
    pub to: Address,
    pub kind: &'static str,
    pub bytes: Vec<u8>,
}

fn kind_of(message: &Message) -> &'static str {
    match message {
        Message::Ping(_) => "Ping",
        Message::Ack(_) => "Ack",
        Message::DirectTransfer(_) => "DirectTransfer",
        Message::MediatedTransfer(_) => "MediatedTransfer",
        Message::SecretRequest(_) => "SecretRequest",
        Message::Secret(_) => "Secret",
        Message::TransferTimeout(_) => "TransferTimeout",
        Message::CancelTransfer(_) => "CancelTransfer",
        Message::RejectTransfer(_) => "RejectTransfer",
    }
}

/// One node's send side of the mesh: hands signed bytes straight to the
/// destination node's `on_raw`, dropped via a spawned task so a long chain
/// of hops never recurses through nested `.await`s on one stack.
pub struct MeshTransport {
    from: Address,
    network: Arc<Network>,
    filter: Filter,
    trace: Arc<StdMutex<Vec<WireTrace>>>,
}

impl MeshTransport {
    pub fn new(from: Address, network: Arc<Network>, filter: Filter, trace: Arc<StdMutex<Vec<WireTrace>>>) -> Arc<Self> {
        Arc::new(Self { from, network, filter, trace })
    }
}

#[async_trait]
impl Transport for MeshTransport {
    async fn send_raw(&self, dest: Address, bytes: Vec<u8>) -> Result<(), TransportError> {
        let message = Message::from_wire_bytes(&bytes).expect("scenario nodes only ever emit well-formed messages");
        if !(self.filter)(&message) {
            return Ok(());
        }
        self.trace.lock().unwrap().push(WireTrace { from: self.from, to: dest, kind: kind_of(&message), bytes: bytes.clone() });

        let network = self.network.clone();
        tokio::spawn(async move {
            if let Some(node) = network.get(dest) {
                node.on_raw(bytes).await;
            }
        });
        Ok(())
    }
}

/// Builds, registers and starts one node with its own slice of channel
/// topology, wired into `network` over a `MeshTransport`.
#[allow(clippy::too_many_arguments)]
pub async fn spawn_node(
    byte: u8,
    asset_id: AssetId,
    network: &Arc<Network>,
    clock: Arc<AtomicU64>,
    edges: Vec<(Address, Address)>,
    channels: Vec<ChannelSpec>,
    filter: Filter,
    trace: Arc<StdMutex<Vec<WireTrace>>>,
) -> Arc<Node> {
    let chain = Arc::new(ScenarioChain::new(edges, channels, clock));
    let node = Node::new(key(byte), fast_config(), chain, Arc::new(NullDiscovery), test_logger());
    node.register_registry(asset_id).await.unwrap();
    network.register(node.clone());
    let transport = MeshTransport::new(node.address(), network.clone(), filter, trace);
    node.clone().start(transport, Duration::from_millis(10));
    node
}
