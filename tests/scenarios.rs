//! Multi-node scenario tests (§8): real [`lockmesh::node::Node`]s wired
//! together over an in-memory mesh, exercising direct transfers, multi-hop
//! mediated transfers, timeout cascades, retransmit dedup, routing failure
//! and concurrent sends from one sender.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use lockmesh::messages::Message;
use lockmesh::primitives::TokenAmount;

use common::*;

#[tokio::test]
async fn s1_direct_transfer_between_two_partners_moves_balance_with_no_lock() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let (a, b) = (addr(1), addr(2));
    let channel = contract(1);

    let node_a = spawn_node(
        1,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_b = spawn_node(
        2,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: a, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;

    node_a.transfer(asset_id, TokenAmount(10), b).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(node_a.available_balance(asset_id, b), Some(TokenAmount(90)));
    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(110)));

    let trace = trace.lock().unwrap();
    assert_eq!(trace.iter().filter(|t| t.kind == "DirectTransfer").count(), 1);
    assert_eq!(trace.iter().filter(|t| t.kind == "Ack").count(), 1);
}

#[tokio::test]
async fn s2_mediated_transfer_settles_every_hop_along_a_three_hop_path() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let (a, b, c, d) = (addr(1), addr(2), addr(3), addr(4));
    let edges = vec![(a, b), (b, c), (c, d)];
    let (cab, cbc, ccd) = (contract(1), contract(2), contract(3));

    let node_a = spawn_node(
        1,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![ChannelSpec { contract: cab, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_b = spawn_node(
        2,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![
            ChannelSpec { contract: cab, partner: a, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
            ChannelSpec { contract: cbc, partner: c, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
        ],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_c = spawn_node(
        3,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![
            ChannelSpec { contract: cbc, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
            ChannelSpec { contract: ccd, partner: d, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
        ],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_d = spawn_node(
        4,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![ChannelSpec { contract: ccd, partner: c, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;

    node_a.transfer(asset_id, TokenAmount(10), d).await.unwrap();
    // The initiator returns as soon as it reveals to its own next hop;
    // give the downstream hops time to settle behind it.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(node_a.available_balance(asset_id, b), Some(TokenAmount(90)));
    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(110)));
    assert_eq!(node_b.available_balance(asset_id, c), Some(TokenAmount(90)));
    assert_eq!(node_c.available_balance(asset_id, b), Some(TokenAmount(110)));
    assert_eq!(node_c.available_balance(asset_id, d), Some(TokenAmount(90)));
    assert_eq!(node_d.available_balance(asset_id, c), Some(TokenAmount(110)));
}

#[tokio::test]
async fn s3_a_target_that_never_reveals_unwinds_and_locks_expire_back_to_original_balances() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let (a, b, c, d) = (addr(1), addr(2), addr(3), addr(4));
    let edges = vec![(a, b), (b, c), (c, d)];
    let (cab, cbc, ccd) = (contract(1), contract(2), contract(3));

    // D drops its own outbound SecretRequest, so no hop ever learns the secret.
    let drop_secret_request: Filter = Arc::new(|message| !matches!(message, Message::SecretRequest(_)));

    let node_a = spawn_node(
        1,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![ChannelSpec { contract: cab, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_b = spawn_node(
        2,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![
            ChannelSpec { contract: cab, partner: a, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
            ChannelSpec { contract: cbc, partner: c, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
        ],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_c = spawn_node(
        3,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![
            ChannelSpec { contract: cbc, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
            ChannelSpec { contract: ccd, partner: d, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) },
        ],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_d = spawn_node(
        4,
        asset_id,
        &network,
        clock.clone(),
        edges.clone(),
        vec![ChannelSpec { contract: ccd, partner: c, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        drop_secret_request,
        trace.clone(),
    )
    .await;

    let ticking_clock = clock.clone();
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(2)).await;
            ticking_clock.fetch_add(1, Ordering::Relaxed);
        }
    });

    let result = node_a.transfer(asset_id, TokenAmount(10), d).await;
    assert!(result.is_err());

    // Let the clock cross every lock's expiration and the poller reap them.
    tokio::time::sleep(Duration::from_millis(400)).await;
    ticker.abort();

    assert_eq!(node_a.available_balance(asset_id, b), Some(TokenAmount(100)));
    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(100)));
    assert_eq!(node_b.available_balance(asset_id, c), Some(TokenAmount(100)));
    assert_eq!(node_c.available_balance(asset_id, b), Some(TokenAmount(100)));
    assert_eq!(node_c.available_balance(asset_id, d), Some(TokenAmount(100)));
    assert_eq!(node_d.available_balance(asset_id, c), Some(TokenAmount(100)));
}

#[tokio::test]
async fn s4_a_replayed_direct_transfer_is_rejected_without_double_crediting() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let (a, b) = (addr(1), addr(2));
    let channel = contract(1);

    let node_a = spawn_node(
        1,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_b = spawn_node(
        2,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: a, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;

    node_a.transfer(asset_id, TokenAmount(10), b).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(110)));

    let replayed_bytes = {
        let trace = trace.lock().unwrap();
        trace.iter().find(|t| t.kind == "DirectTransfer").expect("a DirectTransfer was sent").bytes.clone()
    };
    node_b.on_raw(replayed_bytes.clone()).await;
    node_b.on_raw(replayed_bytes).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(110)));
    assert_eq!(node_a.available_balance(asset_id, b), Some(TokenAmount(90)));
}

#[tokio::test]
async fn s5_transfer_with_no_route_to_the_target_fails_with_no_path() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let a = addr(1);

    let node_a = spawn_node(1, asset_id, &network, clock, Vec::new(), Vec::new(), allow_all(), trace).await;

    let result = node_a.transfer(asset_id, TokenAmount(10), addr(99)).await;
    assert!(matches!(result, Err(lockmesh::node::NodeError::Graph(lockmesh::graph::GraphError::NoPath { source, target })) if source == a && target == addr(99)));
}

#[tokio::test]
async fn s6_two_concurrent_direct_transfers_from_the_same_sender_both_settle() {
    let network = Network::new();
    let clock = Arc::new(AtomicU64::new(1));
    let trace = Arc::new(StdMutex::new(Vec::new()));
    let asset_id = asset();
    let (a, b) = (addr(1), addr(2));
    let channel = contract(1);

    let node_a = spawn_node(
        1,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: b, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;
    let node_b = spawn_node(
        2,
        asset_id,
        &network,
        clock.clone(),
        vec![(a, b)],
        vec![ChannelSpec { contract: channel, partner: a, our_balance: TokenAmount(100), partner_balance: TokenAmount(100) }],
        allow_all(),
        trace.clone(),
    )
    .await;

    let (first, second) = tokio::join!(node_a.transfer(asset_id, TokenAmount(10), b), node_a.transfer(asset_id, TokenAmount(15), b));
    first.unwrap();
    second.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(node_a.available_balance(asset_id, b), Some(TokenAmount(75)));
    assert_eq!(node_b.available_balance(asset_id, a), Some(TokenAmount(125)));
}
