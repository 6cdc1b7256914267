//! `ReplicatedNode` scenarios grounded on `examples/original_source/bh_test.go`:
//! cancellation before commit (spec.md §8 scenario 6), and ConfChange
//! validation (spec.md §4.3).

use std::collections::BTreeMap;

use beehive_core::cell::{Cell, MappedCells};
use beehive_core::config::HiveConfig;
use beehive_core::node::ReplicatedNode;
use beehive_core::{Command, NodeInfo};
use openraft::BasicNode;

async fn start_node(dir: &std::path::Path, id: u64, addr: &str) -> std::sync::Arc<ReplicatedNode> {
    let cfg = HiveConfig::builder()
        .with_node_id(id)
        .with_addr(addr)
        .with_data_dir(dir)
        .with_raft_elect_timeout_ms(100)
        .with_raft_tick_interval_ms(20)
        .build();

    let mut members = BTreeMap::new();
    members.insert(id, BasicNode { addr: addr.to_string() });

    ReplicatedNode::start(&cfg, true, members).await.expect("node starts")
}

#[tokio::test]
async fn cancelling_before_commit_returns_cancelled_and_apply_still_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), 1, "127.0.0.1:17101").await;

    let cells = MappedCells::single(Cell::new("D", "a"));
    let cmd =
        Command::ClaimCells { cells: cells.clone(), bee: 1, owner: NodeInfo { id: 1, addr: "127.0.0.1:17101".into() } };

    // An already-resolved cancel future fires immediately, racing the
    // proposal's own commit.
    let result = node.process_cancellable(cmd, async {}).await;
    assert!(result.is_err(), "an immediately-ready cancel future should win the race");

    // Give the proposal a moment to actually commit in the background;
    // the caller above must never have observed its Response, but the
    // state machine still applies it exactly once.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let owner = node.store.owner_of(&Cell::new("D", "a")).await;
    assert!(owner.is_some(), "Apply still runs even though the caller cancelled");
}

#[tokio::test]
async fn conf_change_rejects_zero_node_id() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), 1, "127.0.0.1:17102").await;

    let err = node.add_node(NodeInfo { id: 0, addr: "x".into() }).await.unwrap_err();
    assert!(err.to_string().contains("nil") || err.to_string().contains("0"));
}

#[tokio::test]
async fn conf_change_rejects_adding_an_existing_member() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), 1, "127.0.0.1:17103").await;

    let err = node.add_node(NodeInfo { id: 1, addr: "127.0.0.1:17103".into() }).await.unwrap_err();
    assert!(err.to_string().contains("already a member"));
}

#[tokio::test]
async fn conf_change_rejects_removing_a_non_member() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), 1, "127.0.0.1:17104").await;

    let err = node.remove_node(NodeInfo { id: 99, addr: "x".into() }).await.unwrap_err();
    assert!(err.to_string().contains("not a member"));
}

#[tokio::test]
async fn a_removed_node_cannot_be_re_added() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), 1, "127.0.0.1:17105").await;

    let joiner = NodeInfo { id: 2, addr: "127.0.0.1:17106".into() };
    node.add_learner(joiner.clone()).await.expect("add_learner succeeds");
    node.add_node(joiner.clone()).await.expect("add_node succeeds");
    node.remove_node(joiner.clone()).await.expect("remove_node succeeds");

    // The removal is replicated through the store, not tracked only in
    // this node's local memory, so it survives the membership round
    // trip above and rejects a later re-add.
    let err = node.add_node(joiner).await.unwrap_err();
    assert!(err.to_string().contains("was removed"));
}
