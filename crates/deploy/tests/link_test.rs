//! Integration tests for cross-chain link reconciliation.

mod common;

use alloy_core::primitives::Address;
use common::{Failure, MockChain, MockTx, TestStore};
use nexus_deploy::{
    ChainDeploymentRecord, GatewayLink, LinkOutcome, LinkReconciler, ModuleKind, Network,
    RecordStore,
};

fn gateway_of(chain_id: u64) -> Address {
    Address::repeat_byte(0x10 + chain_id as u8)
}

/// Persist a record for `chain_id`, with a routing-gateway if `with_gateway`.
fn seed(store: &RecordStore, chain_id: u64, with_gateway: bool) -> ChainDeploymentRecord {
    let mut record = ChainDeploymentRecord::new(chain_id, format!("Chain{}", chain_id));
    if with_gateway {
        record
            .record_module(ModuleKind::RoutingGateway, gateway_of(chain_id))
            .unwrap();
    }
    store.save(&record).unwrap();
    record
}

fn reconciler(store: &RecordStore) -> LinkReconciler<'_> {
    LinkReconciler::new(store, common::test_module_deployer())
}

fn link_to(chain_id: u64) -> GatewayLink {
    GatewayLink {
        target_chain_id: chain_id,
        target_gateway_address: gateway_of(chain_id),
    }
}

#[tokio::test]
async fn test_links_every_other_chain() {
    let store = TestStore::new();
    for chain_id in 1..=3 {
        seed(&store.store, chain_id, true);
    }
    let chain = MockChain::new("chain-1");

    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    assert_eq!(outcome, LinkOutcome::Linked(vec![link_to(2), link_to(3)]));
    assert_eq!(
        chain.submitted(),
        vec![MockTx::Initialize {
            gateway: gateway_of(1),
            routes: vec![
                (2, "Chain2".to_string(), gateway_of(2)),
                (3, "Chain3".to_string(), gateway_of(3)),
            ],
        }]
    );

    let record = store.store.load(1).unwrap().unwrap();
    assert_eq!(record.links, vec![link_to(2), link_to(3)]);
}

#[tokio::test]
async fn test_full_mesh() {
    let store = TestStore::new();
    for chain_id in 1..=3 {
        seed(&store.store, chain_id, true);
    }

    for chain_id in 1..=3 {
        let chain = MockChain::new(format!("chain-{}", chain_id));
        reconciler(&store.store)
            .reconcile(&chain, chain_id)
            .await
            .unwrap();
    }

    for record in store.store.list().unwrap() {
        let mut targets: Vec<u64> = record.links.iter().map(|link| link.target_chain_id).collect();
        targets.sort();
        let expected: Vec<u64> = (1..=3).filter(|id| *id != record.chain_id).collect();
        assert_eq!(targets, expected, "links of chain {}", record.chain_id);
    }
}

#[tokio::test]
async fn test_linking_is_one_shot() {
    let store = TestStore::new();
    seed(&store.store, 1, true);
    seed(&store.store, 2, true);
    let chain = MockChain::new("chain-1");

    reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    // A chain appearing later is not added to an already configured gateway.
    seed(&store.store, 3, true);
    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    assert_eq!(outcome, LinkOutcome::AlreadyLinked(vec![link_to(2)]));
    assert_eq!(chain.submitted().len(), 1);
    assert_eq!(store.store.load(1).unwrap().unwrap().links, vec![link_to(2)]);
}

#[tokio::test]
async fn test_missing_source_gateway_is_fatal() {
    let store = TestStore::new();
    let source = seed(&store.store, 1, false);
    seed(&store.store, 2, true);
    let chain = MockChain::new("chain-1");

    let result = reconciler(&store.store).reconcile(&chain, 1).await;

    assert!(result.is_err());
    assert!(chain.submitted().is_empty());
    assert_eq!(store.store.load(1).unwrap().unwrap(), source);
}

#[tokio::test]
async fn test_missing_source_record_is_fatal() {
    let store = TestStore::new();
    seed(&store.store, 2, true);
    let chain = MockChain::new("chain-1");

    assert!(reconciler(&store.store).reconcile(&chain, 1).await.is_err());
    assert!(chain.submitted().is_empty());
    assert!(store.store.load(1).unwrap().is_none());
}

#[tokio::test]
async fn test_peers_without_gateway_are_skipped() {
    let store = TestStore::new();
    seed(&store.store, 1, true);
    seed(&store.store, 2, false);
    seed(&store.store, 3, true);
    let chain = MockChain::new("chain-1");

    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    assert_eq!(outcome, LinkOutcome::Linked(vec![link_to(3)]));
}

#[tokio::test]
async fn test_no_targets_sends_nothing() {
    let store = TestStore::new();
    seed(&store.store, 1, true);
    seed(&store.store, 2, false);
    let chain = MockChain::new("chain-1");

    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    assert_eq!(outcome, LinkOutcome::NoTargets);
    assert!(chain.submitted().is_empty());
    assert!(store.store.load(1).unwrap().unwrap().links.is_empty());
}

#[tokio::test]
async fn test_failed_initialize_leaves_record_untouched() {
    let store = TestStore::new();
    seed(&store.store, 1, true);
    seed(&store.store, 2, true);
    let chain = MockChain::new("chain-1");
    chain.fail_once(Failure::Revert, |tx| matches!(tx, MockTx::Initialize { .. }));

    let result = reconciler(&store.store).reconcile(&chain, 1).await;
    assert!(result.is_err());
    assert!(store.store.load(1).unwrap().unwrap().links.is_empty());

    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();
    assert_eq!(outcome, LinkOutcome::Linked(vec![link_to(2)]));
    assert_eq!(chain.submitted().len(), 2);
    assert_eq!(chain.applied().len(), 1);
}

#[tokio::test]
async fn test_namespaces_do_not_mix() {
    let store = TestStore::new();
    seed(&store.store, 1, true);

    let mainnet = RecordStore::open(store.dir.path(), Network::Mainnet).unwrap();
    seed(&mainnet, 2, true);

    let chain = MockChain::new("chain-1");
    let outcome = reconciler(&store.store).reconcile(&chain, 1).await.unwrap();

    assert_eq!(outcome, LinkOutcome::NoTargets);
}
