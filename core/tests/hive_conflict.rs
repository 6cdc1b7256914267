//! Classification-conflict rejection (spec.md §8 scenario 5): a
//! message whose Map result spans cells already owned by different
//! bees is rejected, and neither bee ever sees a Rcv.

use std::collections::BTreeMap;

use async_trait::async_trait;
use beehive_core::app::{Handler, MapContext, RcvContext};
use beehive_core::cell::{Cell, MappedCells};
use beehive_core::config::HiveConfig;
use beehive_core::errors::BeehiveError;
use beehive_core::hive::Hive;
use beehive_core::{Command, NodeInfo};
use openraft::BasicNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Ping;

struct SplitHandler;

#[async_trait]
impl Handler for SplitHandler {
    type Msg = Ping;

    fn map(&self, _msg: &Ping, _ctx: &MapContext) -> Option<MappedCells> {
        MappedCells::new([Cell::new("D", "a"), Cell::new("D", "b")])
    }

    async fn rcv(&self, _msg: Ping, _ctx: &RcvContext) -> anyhow::Result<()> {
        panic!("a classification conflict must never reach Rcv");
    }
}

#[tokio::test]
async fn split_ownership_is_rejected_before_any_rcv() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = HiveConfig::builder()
        .with_node_id(1)
        .with_addr("127.0.0.1:17201")
        .with_data_dir(dir.path())
        .with_raft_elect_timeout_ms(100)
        .with_raft_tick_interval_ms(20)
        .build();

    let mut members = BTreeMap::new();
    members.insert(1, BasicNode { addr: cfg.addr.clone() });
    let hive = Hive::start(&cfg, true, members).await.unwrap();

    let owner = NodeInfo { id: 1, addr: cfg.addr.clone() };
    hive.node
        .process(Command::ClaimCells {
            cells: MappedCells::single(Cell::new("D", "a")),
            bee: 1,
            owner: owner.clone(),
        })
        .await
        .unwrap();
    hive.node
        .process(Command::ClaimCells {
            cells: MappedCells::single(Cell::new("D", "b")),
            bee: 2,
            owner,
        })
        .await
        .unwrap();

    let app = hive.new_app("Split");
    app.handle("ping", SplitHandler);

    let err = hive.emit("Split", "ping", &Ping).await.unwrap_err();
    assert!(matches!(err, BeehiveError::ClassificationConflict));
}
