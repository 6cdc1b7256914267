//! Recognized hive configuration (spec.md 6), built with a
//! teacher-style builder (`core/src/builder.rs`'s `HydraDBBuilder`
//! pattern, generalized) plus `serde` so the same struct loads from a
//! config file or CLI args.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::NodeId;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HiveConfig {
    pub node_id: NodeId,
    /// Advertised address for this hive.
    pub addr: String,
    /// Existing peers to contact when joining a running cluster.
    pub peer_addrs: Vec<String>,
    pub raft_elect_timeout_ms: u64,
    pub raft_tick_interval_ms: u64,
    /// Entries between snapshots.
    pub snap_count: u64,
    pub data_dir: PathBuf,
    /// Bounded-mailbox capacity per bee (Design Notes, spec.md 9).
    pub mailbox_capacity: usize,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            addr: "127.0.0.1:7000".to_string(),
            peer_addrs: Vec::new(),
            raft_elect_timeout_ms: 1000,
            raft_tick_interval_ms: 100,
            snap_count: 1000,
            data_dir: PathBuf::from("./data"),
            mailbox_capacity: 256,
        }
    }
}

impl HiveConfig {
    pub fn raft_elect_timeout(&self) -> Duration {
        Duration::from_millis(self.raft_elect_timeout_ms)
    }

    pub fn raft_tick_interval(&self) -> Duration {
        Duration::from_millis(self.raft_tick_interval_ms)
    }

    pub fn builder() -> HiveConfigBuilder {
        HiveConfigBuilder::new()
    }
}

#[derive(Default)]
pub struct HiveConfigBuilder {
    cfg: HiveConfig,
}

impl HiveConfigBuilder {
    pub fn new() -> Self {
        Self { cfg: HiveConfig::default() }
    }

    pub fn with_node_id(mut self, id: NodeId) -> Self {
        self.cfg.node_id = id;
        self
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.cfg.addr = addr.into();
        self
    }

    pub fn with_peer_addrs(mut self, peers: Vec<String>) -> Self {
        self.cfg.peer_addrs = peers;
        self
    }

    pub fn with_raft_elect_timeout_ms(mut self, ms: u64) -> Self {
        self.cfg.raft_elect_timeout_ms = ms;
        self
    }

    pub fn with_raft_tick_interval_ms(mut self, ms: u64) -> Self {
        self.cfg.raft_tick_interval_ms = ms;
        self
    }

    pub fn with_snap_count(mut self, n: u64) -> Self {
        self.cfg.snap_count = n;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.data_dir = dir.into();
        self
    }

    pub fn with_mailbox_capacity(mut self, n: usize) -> Self {
        self.cfg.mailbox_capacity = n;
        self
    }

    pub fn build(self) -> HiveConfig {
        self.cfg
    }
}
