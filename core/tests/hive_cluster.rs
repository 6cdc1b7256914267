//! Multi-hive scenarios from spec.md §8: scenario 3 (joining a new
//! node to a running cluster, then confirming a leader-proposed claim
//! replicates to it) and scenario 4 (the cluster keeps committing after
//! its leader goes dark). Grounded on
//! `examples/original_source/hive_test.go`'s `TestHiveCluster`/
//! `TestHiveFailure` timing shape (`3 * RaftElectTimeout` before
//! expecting a new leader).

use std::collections::BTreeMap;
use std::time::Duration;

use beehive_core::cell::{Cell, MappedCells};
use beehive_core::config::HiveConfig;
use beehive_core::hive::Hive;
use beehive_core::{Command, NodeInfo};
use openraft::BasicNode;
use tokio::task::JoinHandle;

const ELECT_TIMEOUT_MS: u64 = 150;

struct Node {
    hive: std::sync::Arc<Hive>,
    server: JoinHandle<()>,
}

async fn start_hive(
    dir: &std::path::Path,
    id: u64,
    addr: &str,
    bootstrap: bool,
    members: BTreeMap<u64, BasicNode>,
) -> Node {
    let cfg = HiveConfig::builder()
        .with_node_id(id)
        .with_addr(addr)
        .with_data_dir(dir)
        .with_raft_elect_timeout_ms(ELECT_TIMEOUT_MS)
        .with_raft_tick_interval_ms(30)
        .build();

    let hive = Hive::start(&cfg, bootstrap, members).await.expect("hive starts");
    let serve_hive = hive.clone();
    let serve_addr = addr.to_string();
    let server = tokio::spawn(async move {
        let _ = beehive_core::network::serve(serve_hive, &serve_addr).await;
    });
    // give the listener a moment to bind before any peer dials it
    tokio::time::sleep(Duration::from_millis(50)).await;

    Node { hive, server }
}

async fn join(leader: &Node, node: &NodeInfo) {
    leader.hive.node.add_learner(node.clone()).await.expect("add_learner succeeds");
    leader.hive.node.add_node(node.clone()).await.expect("add_node succeeds");
}

#[tokio::test]
async fn three_hive_cluster_join_replicates_claims() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let dir3 = tempfile::tempdir().unwrap();

    let mut seed = BTreeMap::new();
    seed.insert(1, BasicNode { addr: "127.0.0.1:17301".into() });
    let node1 = start_hive(dir1.path(), 1, "127.0.0.1:17301", true, seed).await;
    let node2 = start_hive(dir2.path(), 2, "127.0.0.1:17302", false, BTreeMap::new()).await;
    let node3 = start_hive(dir3.path(), 3, "127.0.0.1:17303", false, BTreeMap::new()).await;

    join(&node1, &NodeInfo { id: 2, addr: "127.0.0.1:17302".into() }).await;
    join(&node1, &NodeInfo { id: 3, addr: "127.0.0.1:17303".into() }).await;

    node1
        .hive
        .node
        .process(Command::ClaimCells {
            cells: MappedCells::single(Cell::new("D", "x")),
            bee: 1,
            owner: node1.hive.info.clone(),
        })
        .await
        .expect("claim commits on the leader");

    tokio::time::sleep(Duration::from_millis(ELECT_TIMEOUT_MS * 2)).await;

    for node in [&node2, &node3] {
        let owner = node.hive.store.owner_of(&Cell::new("D", "x")).await;
        assert!(owner.is_some(), "a claim committed on the leader must replicate to every joined voter");
    }

    node1.server.abort();
    node2.server.abort();
    node3.server.abort();
}

#[tokio::test]
async fn cluster_keeps_committing_after_leader_goes_dark() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let dir3 = tempfile::tempdir().unwrap();

    let mut seed = BTreeMap::new();
    seed.insert(1, BasicNode { addr: "127.0.0.1:17311".into() });
    let node1 = start_hive(dir1.path(), 1, "127.0.0.1:17311", true, seed).await;
    let node2 = start_hive(dir2.path(), 2, "127.0.0.1:17312", false, BTreeMap::new()).await;
    let node3 = start_hive(dir3.path(), 3, "127.0.0.1:17313", false, BTreeMap::new()).await;

    join(&node1, &NodeInfo { id: 2, addr: "127.0.0.1:17312".into() }).await;
    join(&node1, &NodeInfo { id: 3, addr: "127.0.0.1:17313".into() }).await;

    // Node 1 bootstrapped the cluster and is its only leader candidate
    // so far. Kill its HTTP listener rather than just calling
    // `Hive::stop` — the surviving peers must actually lose contact,
    // not just have the leader politely unclaim its bees.
    node1.server.abort();

    tokio::time::sleep(Duration::from_millis(ELECT_TIMEOUT_MS * 4)).await;

    let m2 = node2.hive.node.raft.metrics().borrow().clone();
    let m3 = node3.hive.node.raft.metrics().borrow().clone();
    let leader = m2.current_leader.or(m3.current_leader);
    assert!(leader.is_some() && leader != Some(1), "a surviving node must win a new election");

    let survivor = if m2.current_leader == leader { &node2 } else { &node3 };
    survivor
        .hive
        .node
        .process(Command::ClaimCells {
            cells: MappedCells::single(Cell::new("D", "y")),
            bee: 2,
            owner: survivor.hive.info.clone(),
        })
        .await
        .expect("the new leader can still commit proposals");

    tokio::time::sleep(Duration::from_millis(ELECT_TIMEOUT_MS * 2)).await;
    let owner = survivor.hive.store.owner_of(&Cell::new("D", "y")).await;
    assert!(owner.is_some(), "a proposal against the new leader must still replicate");

    node2.server.abort();
    node3.server.abort();
}
