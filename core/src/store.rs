//! The `Store` contract (spec.md 4.1) realized as openraft's
//! `RaftStateMachine` + `RaftSnapshotBuilder`, grounded on the
//! teacher's `StateMachineStore`/`StateMachineData` in the original
//! `core/src/lib.rs`. `SotraDB` is replaced by `Payload`: the
//! `CellMap` plus every bee's `Dict` contents.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use openraft::storage::{RaftStateMachine, Snapshot};
use openraft::{
    Entry, EntryPayload, LogId, RaftSnapshotBuilder, RaftTypeConfig, SnapshotMeta, StorageError,
    StorageIOError, StoredMembership,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cell::{Cell, CellMap};
use crate::request_line::RequestLine;
use crate::{BeeId, Command, CommandResult, NodeId, Request, Response, TypeConfig};

pub type DictName = String;

/// A single bee's key/value dictionaries, keyed by dict name then key.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct BeeDicts {
    dicts: HashMap<DictName, HashMap<Vec<u8>, Vec<u8>>>,
}

impl BeeDicts {
    fn dict_mut(&mut self, name: &str) -> &mut HashMap<Vec<u8>, Vec<u8>> {
        self.dicts.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str, key: &[u8]) -> Option<&Vec<u8>> {
        self.dicts.get(name).and_then(|d| d.get(key))
    }
}

/// The replicated payload: cell ownership plus every live bee's dict
/// contents. This whole struct is what `Save`/`Restore` (de)serializes
/// as the snapshot, matching the teacher's "serialize the whole state
/// machine" approach in `build_snapshot`.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Payload {
    pub cells: CellMap,
    bees: HashMap<BeeId, BeeDicts>,
    /// Node ids a conf change has removed. Replicated through `apply`
    /// like everything else in `Payload`, so every member — and a
    /// restarted one, via snapshot — agrees on who was removed instead
    /// of each node tracking it in local, unreplicated memory.
    removed: HashSet<NodeId>,
}

impl Payload {
    pub fn get(&self, bee: BeeId, dict: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.bees.get(&bee).and_then(|d| d.get(dict, key)).cloned()
    }

    fn put(&mut self, bee: BeeId, dict: &str, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        self.bees.entry(bee).or_default().dict_mut(dict).insert(key, value)
    }

    fn del(&mut self, bee: BeeId, dict: &str, key: &[u8]) -> bool {
        self.bees
            .get_mut(&bee)
            .map(|d| d.dict_mut(dict).remove(key).is_some())
            .unwrap_or(false)
    }

    fn drop_bee(&mut self, bee: BeeId) {
        self.bees.remove(&bee);
    }

    pub fn is_removed(&self, node: NodeId) -> bool {
        self.removed.contains(&node)
    }

    fn mark_removed(&mut self, node: NodeId) {
        self.removed.insert(node);
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta<NodeId, openraft::BasicNode>,
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct StateMachineData {
    pub last_applied_log: Option<LogId<NodeId>>,
    pub last_membership: StoredMembership<NodeId, openraft::BasicNode>,
    pub data: Payload,
}

/// The Raft state machine: a copy of this node's data, plus the last
/// snapshot taken of it. Grounded on the teacher's `StateMachineStore`.
#[derive(Debug)]
pub struct BeehiveStateMachine {
    pub state_machine: RwLock<StateMachineData>,
    snapshot_idx: AtomicU64,
    current_snapshot: RwLock<Option<StoredSnapshot>>,
    /// Where `build_snapshot`/`install_snapshot` persist the latest
    /// snapshot so a restart can recover it (spec.md 4.3.2): without
    /// this, purging the WAL up to the snapshot point loses any state
    /// older than the in-memory snapshot the moment the process exits.
    snap_path: PathBuf,
    /// Shared with the owning `ReplicatedNode`. `apply` is the only
    /// place a committed entry's result becomes known, since openraft
    /// owns the Ready-equivalent loop internally; delivering through
    /// this line is how that result reaches the task that originally
    /// called `ReplicatedNode::process` (spec.md 4.2, 4.3.1).
    line: RequestLine,
}

impl BeehiveStateMachine {
    /// Opens (or creates) `<data_dir>/snap/<node_id>` and, if a
    /// snapshot was already persisted there, loads it into the state
    /// machine before `ReplicatedNode::start` constructs the raft
    /// instance on top of it. Without this, a restarted node would come
    /// up with an empty `Payload` even though its WAL was already
    /// purged up to the last snapshot (spec.md 4.3, restart).
    pub fn new(data_dir: &Path, node_id: NodeId) -> anyhow::Result<Arc<Self>> {
        let dir = data_dir.join("snap").join(node_id.to_string());
        std::fs::create_dir_all(&dir)?;
        let snap_path = dir.join("snapshot.json");

        let (state_machine, current_snapshot) = if snap_path.exists() {
            let bytes = std::fs::read(&snap_path)?;
            let stored: StoredSnapshot = serde_json::from_slice(&bytes)?;
            let data: Payload = serde_json::from_slice(&stored.data)?;
            let sm = StateMachineData {
                last_applied_log: stored.meta.last_log_id,
                last_membership: stored.meta.last_membership.clone(),
                data,
            };
            (sm, Some(stored))
        } else {
            (StateMachineData::default(), None)
        };

        let snapshot_idx = current_snapshot
            .as_ref()
            .map(|s| s.meta.snapshot_id.rsplit('-').next().and_then(|n| n.parse().ok()).unwrap_or(0))
            .unwrap_or(0);

        Ok(Arc::new(Self {
            state_machine: RwLock::new(state_machine),
            snapshot_idx: AtomicU64::new(snapshot_idx),
            current_snapshot: RwLock::new(current_snapshot),
            snap_path,
            line: RequestLine::default(),
        }))
    }

    /// Serializes `snapshot` to `snap_path`, overwriting any previous
    /// one. Called after every `build_snapshot`/`install_snapshot` so
    /// the on-disk copy never lags behind what openraft thinks is
    /// current.
    fn persist_snapshot(&self, snapshot: &StoredSnapshot) -> Result<(), StorageError<NodeId>> {
        let bytes = serde_json::to_vec(snapshot).map_err(|e| StorageIOError::write_snapshot(None, &e))?;
        std::fs::write(&self.snap_path, bytes)
            .map_err(|e| StorageIOError::write_snapshot(Some(snapshot.meta.signature()), &e))?;
        Ok(())
    }

    /// Point-in-time read of a dict entry. Reads are served from local
    /// applied state — a bee's own mailbox serialization already makes
    /// this sequentially consistent for its handler (spec.md 4.4).
    pub async fn get(&self, bee: BeeId, dict: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.state_machine.read().await.data.get(bee, dict, key)
    }

    pub async fn owner_of(&self, cell: &Cell) -> Option<crate::cell::Owner> {
        self.state_machine.read().await.data.cells.owner_of(cell).cloned()
    }

    /// Whether a conf change has already removed `node` from the
    /// cluster, per the replicated `Payload::removed` set (spec.md
    /// 4.3's "reject a previously removed node").
    pub async fn is_removed(&self, node: NodeId) -> bool {
        self.state_machine.read().await.data.is_removed(node)
    }

    /// Classifies `cells` against the live cell map. See
    /// `CellMap::resolve`.
    pub async fn resolve(&self, cells: &crate::cell::MappedCells) -> crate::cell::Ownership {
        self.state_machine.read().await.data.cells.resolve(cells)
    }

    /// Registers a wait slot for a proposal this node is about to
    /// submit. See `RequestLine::wait`.
    pub fn wait(&self, id: crate::RequestId) -> crate::request_line::Wait {
        self.line.wait(id)
    }

    /// Frees a wait slot without delivering a response, e.g. on
    /// cancellation. See `RequestLine::cancel`.
    pub fn cancel(&self, id: crate::RequestId) {
        self.line.cancel(id)
    }

    pub fn pending(&self) -> usize {
        self.line.len()
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<BeehiveStateMachine> {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let state_machine = self.state_machine.read().await;
        let data = serde_json::to_vec(&state_machine.data)
            .map_err(|e| StorageIOError::read_state_machine(&e))?;

        let last_applied_log = state_machine.last_applied_log;
        let last_membership = state_machine.last_membership.clone();

        let mut current_snapshot = self.current_snapshot.write().await;
        drop(state_machine);

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = if let Some(last) = last_applied_log {
            format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx)
        } else {
            format!("--{snapshot_idx}")
        };

        let meta = SnapshotMeta { last_log_id: last_applied_log, last_membership, snapshot_id };
        let snapshot = StoredSnapshot { meta: meta.clone(), data: data.clone() };
        self.persist_snapshot(&snapshot)?;
        *current_snapshot = Some(snapshot);

        Ok(Snapshot { meta, snapshot: Box::new(Cursor::new(data)) })
    }
}

impl RaftStateMachine<TypeConfig> for Arc<BeehiveStateMachine> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, openraft::BasicNode>), StorageError<NodeId>>
    {
        let state_machine = self.state_machine.read().await;
        Ok((state_machine.last_applied_log, state_machine.last_membership.clone()))
    }

    #[tracing::instrument(level = "trace", skip(self, entries))]
    async fn apply<I>(&mut self, entries: I) -> Result<Vec<Response>, StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
    {
        let mut res = Vec::new();
        let mut sm = self.state_machine.write().await;

        for entry in entries {
            tracing::debug!(log_id = %entry.log_id, "applying entry to store");
            sm.last_applied_log = Some(entry.log_id);

            match entry.payload {
                // Leader no-ops carry no request and never reach a
                // waiter (spec.md 4.3.1).
                EntryPayload::Blank => res.push(Response::empty(crate::RequestId::default())),
                EntryPayload::Normal(ref req) => {
                    match &req.data {
                        // Empty-Data entries never invoke Apply and
                        // never reach a waiter (spec.md 4.3.1).
                        None => res.push(Response::empty(req.id)),
                        Some(_) => {
                            let response = apply_request(&mut sm.data, req);
                            self.line.call(response.clone());
                            res.push(response);
                        }
                    }
                }
                EntryPayload::Membership(ref mem) => {
                    sm.last_membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                    res.push(Response::empty(crate::RequestId::default()));
                }
            }
        }

        Ok(res)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    #[tracing::instrument(level = "trace", skip(self, snapshot))]
    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, openraft::BasicNode>,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), StorageError<NodeId>> {
        tracing::info!(size = snapshot.get_ref().len(), "installing snapshot");

        let new_snapshot = StoredSnapshot { meta: meta.clone(), data: snapshot.into_inner() };

        let data: Payload = serde_json::from_slice(&new_snapshot.data)
            .map_err(|e| StorageIOError::read_snapshot(Some(new_snapshot.meta.signature()), &e))?;

        let updated = StateMachineData {
            last_applied_log: meta.last_log_id,
            last_membership: meta.last_membership.clone(),
            data,
        };

        let mut state_machine = self.state_machine.write().await;
        *state_machine = updated;

        self.persist_snapshot(&new_snapshot)?;
        let mut current_snapshot = self.current_snapshot.write().await;
        drop(state_machine);
        *current_snapshot = Some(new_snapshot);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        match &*self.current_snapshot.read().await {
            Some(snapshot) => {
                let data = snapshot.data.clone();
                Ok(Some(Snapshot { meta: snapshot.meta.clone(), snapshot: Box::new(Cursor::new(data)) }))
            }
            None => Ok(None),
        }
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }
}

/// Applies one committed `Request` to `payload`, producing the
/// `Response` that will be delivered to the original caller via the
/// `RequestLine`. Empty-payload entries never reach here — `apply`
/// skips `Blank` entries before calling this (spec.md 4.3.1).
fn apply_request(payload: &mut Payload, req: &Request) -> Response {
    let Some(cmd) = &req.data else {
        return Response::empty(req.id);
    };

    match cmd {
        Command::ClaimCells { cells, bee, owner } => {
            // Re-check at commit time: the proposer may have raced
            // another claim between its local check and this commit.
            if cells.iter().any(|c| payload.cells.owner_of(c).is_some()) {
                return Response::error(req.id, "cell already owned");
            }
            payload.cells.claim(cells, *bee, owner.clone());
            Response::ok(req.id, CommandResult::Claimed)
        }
        Command::UnclaimCells { cells } => {
            payload.cells.unclaim(cells);
            Response::ok(req.id, CommandResult::Unclaimed)
        }
        Command::DictPut { bee, dict, key, value } => {
            let prev = payload.put(*bee, dict, key.clone(), value.clone());
            Response::ok(req.id, CommandResult::Put { prev })
        }
        Command::DictDel { bee, dict, key } => {
            let existed = payload.del(*bee, dict, key);
            Response::ok(req.id, CommandResult::Deleted { existed })
        }
        Command::MarkRemoved { node } => {
            payload.mark_removed(*node);
            Response::ok(req.id, CommandResult::Removed)
        }
    }
}

/// Drops all dict state for a removed bee. Called after its unclaim
/// entry commits and its mailbox has drained (spec.md 3, Lifecycles).
pub async fn forget_bee(sm: &BeehiveStateMachine, bee: BeeId) {
    sm.state_machine.write().await.data.drop_bee(bee);
}
