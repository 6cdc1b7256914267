//! The replicated node (spec.md 4.3): drives a raft state machine,
//! turns proposals into committed entries, and applies them to the
//! store. `openraft::Raft` owns the actual tick/Ready-equivalent
//! driver loop; this module is the seam that gives callers the
//! `Process`/`ProcessConfChange` API the spec describes, and the
//! `RequestLine`-based decoupling between a proposing task and the
//! task that eventually applies the committed entry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use openraft::{BasicNode, Config as RaftConfig, SnapshotPolicy};
use tokio::sync::Notify;

use crate::config::HiveConfig;
use crate::errors::{BeehiveError, Result};
use crate::log_store::LogStore;
use crate::store::BeehiveStateMachine;
use crate::{Command, NodeId, NodeInfo, Raft, Request, RequestId, Response};

/// Drives a raft state machine on behalf of one hive. Owns the WAL and
/// the state machine; proposals are correlated with their waiting
/// callers through the `RequestLine` kept inside the state machine
/// (the only place a committed entry's result becomes available,
/// since openraft owns the Ready-equivalent loop internally).
pub struct ReplicatedNode {
    pub id: NodeId,
    pub info: NodeInfo,
    pub raft: Raft,
    pub store: Arc<BeehiveStateMachine>,
    seq: AtomicU64,
    stopped: Notify,
}

impl ReplicatedNode {
    /// Creates (new cluster) or restarts (existing WAL) a node per
    /// spec.md 4.3's construction rule. Node id zero is rejected.
    /// `bootstrap` is only consulted the first time this node id's WAL
    /// is seen: `true` initializes a brand-new single- or multi-member
    /// cluster from `initial_members`; `false` leaves the raft
    /// instance uninitialized so it can be added to an existing
    /// cluster via `add_learner`/`add_node` from that cluster's leader
    /// (spec.md §8 scenario 3).
    pub async fn start(
        cfg: &HiveConfig,
        bootstrap: bool,
        initial_members: BTreeMap<NodeId, BasicNode>,
    ) -> anyhow::Result<Arc<Self>> {
        if cfg.node_id == 0 {
            anyhow::bail!("raft node id cannot be 0");
        }

        let is_new = !LogStore::exists(&cfg.data_dir, cfg.node_id);
        let log_store = LogStore::open(&cfg.data_dir, cfg.node_id)?;
        // Loads any snapshot already persisted under this node's data
        // dir before `openraft::Raft::new` below ever runs, so a
        // restart recovers state the WAL itself may have already
        // purged up to (spec.md 4.3.2).
        let state_machine = BeehiveStateMachine::new(&cfg.data_dir, cfg.node_id)?;

        let raft_config = RaftConfig {
            heartbeat_interval: cfg.raft_tick_interval_ms,
            election_timeout_min: cfg.raft_elect_timeout_ms,
            election_timeout_max: cfg.raft_elect_timeout_ms * 2,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(cfg.snap_count),
            ..Default::default()
        };
        let raft_config = Arc::new(raft_config.validate()?);

        let network = crate::network::transport::HttpNetworkFactory::new(cfg);

        let raft = openraft::Raft::new(
            cfg.node_id,
            raft_config,
            network,
            log_store.clone(),
            state_machine.clone(),
        )
        .await?;

        if is_new && bootstrap {
            tracing::info!(node_id = cfg.node_id, "initializing new raft cluster");
            raft.initialize(initial_members).await?;
        } else if is_new {
            tracing::info!(node_id = cfg.node_id, "waiting to be joined to an existing cluster");
        } else {
            tracing::info!(node_id = cfg.node_id, "restarting raft node from WAL + snapshot");
        }

        let last_log_index = raft.metrics().borrow().last_log_index.unwrap_or(0);
        let seq_seed = last_log_index + 2 * cfg.snap_count;

        Ok(Arc::new(Self {
            id: cfg.node_id,
            info: NodeInfo { id: cfg.node_id, addr: cfg.addr.clone() },
            raft,
            store: state_machine,
            seq: AtomicU64::new(seq_seed),
            stopped: Notify::new(),
        }))
    }

    fn next_id(&self) -> RequestId {
        RequestId { node_id: self.id, seq: self.seq.fetch_add(1, Ordering::Relaxed) }
    }

    /// Proposes `cmd`, blocking until it commits and applies, or until
    /// `cancel` resolves, or until the node stops. Mirrors spec.md
    /// 4.3's `Process`: the response is delivered through the
    /// `RequestLine`, not through `client_write`'s own return value —
    /// that keeps `Apply`'s actual invocation (on openraft's internal
    /// apply task) the single source of truth for the committed
    /// result, exactly as the spec's driver-loop design requires.
    pub async fn process_cancellable(
        &self,
        cmd: Command,
        cancel: impl Future<Output = ()>,
    ) -> Result<Response> {
        let id = self.next_id();
        let req = Request { id, data: Some(cmd) };
        let wait = self.store.wait(id);

        let raft = self.raft.clone();
        let propose = tokio::spawn(async move {
            if let Err(e) = raft.client_write(req).await {
                tracing::debug!(error = %e, "proposal did not commit on this call");
            }
        });

        tokio::select! {
            res = wait => {
                propose.abort();
                res.map_err(|_| BeehiveError::Stopped)
            }
            _ = cancel => {
                self.store.cancel(id);
                Err(BeehiveError::Cancelled(id))
            }
            _ = self.stopped.notified() => {
                self.store.cancel(id);
                Err(BeehiveError::Stopped)
            }
        }
    }

    pub async fn process(&self, cmd: Command) -> Result<Response> {
        self.process_cancellable(cmd, std::future::pending()).await
    }

    /// Validates and submits a configuration change, per spec.md
    /// 4.3's `ConfChange validation` rules: reject a previously
    /// removed node, a zero node id, an add of an existing member, or
    /// a remove of a non-member.
    pub async fn process_conf_change(&self, add: bool, node: NodeInfo) -> Result<()> {
        if node.id == 0 {
            return Err(BeehiveError::Raft("NodeID is nil".into()));
        }
        if self.store.is_removed(node.id).await {
            return Err(BeehiveError::Raft(format!("{} was removed", node.id)));
        }

        let members = self.raft.metrics().borrow().membership_config.membership().clone();
        let is_member = members.voter_ids().any(|id| id == node.id);

        if add && is_member {
            return Err(BeehiveError::Raft(format!("{} is already a member", node.id)));
        }
        if !add && !is_member {
            return Err(BeehiveError::Raft(format!("{} is not a member", node.id)));
        }

        let mut ids: Vec<NodeId> = members.voter_ids().collect();
        if add {
            ids.push(node.id);
        } else {
            ids.retain(|&id| id != node.id);
        }

        self.raft
            .change_membership(ids, false)
            .await
            .map_err(|e| BeehiveError::Raft(e.to_string()))?;

        // Only record the removal once the membership change has
        // actually committed, and replicate it through the same Apply
        // path as everything else in `Payload` (spec.md 4.3).
        if !add {
            self.process(Command::MarkRemoved { node: node.id }).await?;
        }
        Ok(())
    }

    /// Adds `node` as a non-voting learner so it starts receiving the
    /// log before `add_node` promotes it to a voter. openraft requires
    /// a node's address be known this way before it can appear in a
    /// membership change.
    pub async fn add_learner(&self, node: NodeInfo) -> Result<()> {
        if node.id == 0 {
            return Err(BeehiveError::Raft("NodeID is nil".into()));
        }
        self.raft
            .add_learner(node.id, BasicNode { addr: node.addr }, true)
            .await
            .map_err(|e| BeehiveError::Raft(e.to_string()))?;
        Ok(())
    }

    pub async fn add_node(&self, node: NodeInfo) -> Result<()> {
        self.process_conf_change(true, node).await
    }

    pub async fn remove_node(&self, node: NodeInfo) -> Result<()> {
        self.process_conf_change(false, node).await
    }

    /// Unblocks all pending waiters with a stopped error and marks the
    /// node as no longer accepting proposals (spec.md 5).
    pub fn stop(&self) {
        self.stopped.notify_waiters();
    }

    pub fn pending_requests(&self) -> usize {
        self.store.pending()
    }
}
