//! The hive: one process's coordinator. Classifies incoming messages
//! into cells (spec.md 4.4), resolves who owns those cells via the
//! replicated `CellMap`, and either dispatches locally to a bee's
//! mailbox or forwards to the remote hive that already owns them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use openraft::BasicNode;
use serde::Serialize;

use crate::app::{App, MapContext};
use crate::bee::{Bee, BeeHandle, Envelope};
use crate::cell::{MappedCells, Ownership};
use crate::config::HiveConfig;
use crate::errors::{BeehiveError, Result};
use crate::node::ReplicatedNode;
use crate::store::BeehiveStateMachine;
use crate::{BeeId, Command, NodeInfo};

/// A process's single coordinator. Holds no back-pointers to the bees
/// it spawns — only `BeeHandle`s in the `bees` registry, looked up by
/// id, per spec.md 9's resolution of the Hive/Bee/Node reference
/// cycle.
pub struct Hive {
    pub info: NodeInfo,
    pub node: Arc<ReplicatedNode>,
    pub store: Arc<BeehiveStateMachine>,
    apps: Arc<DashMap<String, Arc<App>>>,
    bees: DashMap<BeeId, BeeHandle>,
    next_bee_id: AtomicU64,
    transport: reqwest::Client,
    mailbox_capacity: usize,
}

impl Hive {
    /// Starts the replicated node and wraps it in a hive ready to
    /// register apps and accept `Emit`s. `initial_members` is only
    /// consulted the first time this node id's WAL directory is seen
    /// (spec.md 4.3).
    pub async fn start(
        cfg: &HiveConfig,
        bootstrap: bool,
        initial_members: BTreeMap<crate::NodeId, BasicNode>,
    ) -> anyhow::Result<Arc<Self>> {
        let node = ReplicatedNode::start(cfg, bootstrap, initial_members).await?;
        let store = node.store.clone();
        let transport = reqwest::Client::builder()
            .timeout(cfg.raft_elect_timeout())
            .build()?;

        Ok(Arc::new(Self {
            info: node.info.clone(),
            node,
            store,
            apps: Arc::new(DashMap::new()),
            bees: DashMap::new(),
            next_bee_id: AtomicU64::new(1),
            transport,
            mailbox_capacity: cfg.mailbox_capacity,
        }))
    }

    /// Registers a new named application. Matches spec.md 6's
    /// `hive.NewApp(name)`; the returned handle is used to attach
    /// per-message-type handlers with `App::handle`.
    pub fn new_app(&self, name: impl Into<String>) -> Arc<App> {
        let app = Arc::new(App::new(name));
        self.apps.insert(app.name.clone(), app.clone());
        app
    }

    /// Encodes and dispatches `msg`, fire-and-forget, per spec.md
    /// 4.4's `Emit`.
    pub async fn emit<M: Serialize>(&self, app: &str, message_type: &str, msg: &M) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.dispatch_raw(app, message_type, payload).await
    }

    /// Classifies and routes an already-encoded message. Used both by
    /// the local `emit` and by the `/emit` HTTP handler receiving a
    /// message forwarded from another hive.
    pub async fn dispatch_raw(&self, app: &str, message_type: &str, payload: Vec<u8>) -> Result<()> {
        let app_handle = self.apps.get(app).ok_or(BeehiveError::NoHandler)?.clone();
        let handler = app_handle.handler_for(message_type).ok_or(BeehiveError::NoHandler)?;

        let ctx = MapContext { local_hive: self.info.clone() };
        let cells = handler.map(&payload, &ctx)?;

        match self.store.resolve(&cells).await {
            Ownership::Unclaimed => {
                self.claim_and_enqueue(cells, app, message_type, payload).await
            }
            Ownership::SingleOwner(owner) if owner.hive == self.info => {
                self.enqueue_local(owner.bee, app, message_type, payload).await
            }
            Ownership::SingleOwner(owner) => {
                self.forward(&owner.hive, app, message_type, payload).await
            }
            Ownership::Conflict => Err(BeehiveError::ClassificationConflict),
        }
    }

    async fn claim_and_enqueue(
        &self,
        cells: MappedCells,
        app: &str,
        message_type: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let bee_id = self.next_bee_id.fetch_add(1, Ordering::Relaxed);
        let cmd = Command::ClaimCells { cells: cells.clone(), bee: bee_id, owner: self.info.clone() };

        match self.node.process(cmd).await?.data {
            Some(crate::CommandResult::Claimed) => {}
            _ => return Err(BeehiveError::CellAlreadyOwned),
        }

        let handle = Bee::spawn(
            bee_id,
            cells.clone(),
            self.node.clone(),
            self.store.clone(),
            self.app_registry(),
            self.mailbox_capacity,
        );
        self.bees.insert(bee_id, handle);

        self.enqueue_local(bee_id, app, message_type, payload).await
    }

    async fn enqueue_local(
        &self,
        bee: BeeId,
        app: &str,
        message_type: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let Some(handle) = self.bees.get(&bee) else {
            // Known owner but no local mailbox — e.g. right after a
            // restart before bees are rehydrated. Treat as unclaimed
            // from this hive's perspective: caller retries via Emit.
            return Err(BeehiveError::UnknownBee(bee));
        };
        handle
            .mailbox
            .send(Envelope { app: app.to_string(), message_type: message_type.to_string(), payload })
            .await
            .map_err(|_| BeehiveError::UnknownBee(bee))
    }

    async fn forward(&self, remote: &NodeInfo, app: &str, message_type: &str, payload: Vec<u8>) -> Result<()> {
        let url = format!("http://{}/emit", remote.addr);
        let body = crate::network::api::EmitRequest {
            app: app.to_string(),
            message_type: message_type.to_string(),
            payload: serde_json::from_slice(&payload)?,
        };
        self.transport
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BeehiveError::Raft(e.to_string()))?;
        Ok(())
    }

    fn app_registry(&self) -> Arc<DashMap<String, Arc<App>>> {
        // Bees hold this shared map directly rather than a
        // back-pointer to the whole hive (spec.md 9).
        self.apps.clone()
    }

    /// Releases every bee this hive owns and stops accepting new
    /// proposals. Intended for graceful shutdown (spec.md 5).
    pub async fn stop(&self) {
        for entry in self.bees.iter() {
            let (bee, cells) = (entry.id, entry.cells.clone());
            if let Err(e) =
                crate::bee::unclaim_and_forget(&self.node, &self.store, bee, &cells).await
            {
                tracing::warn!(bee, error = %e, "failed to unclaim bee during shutdown");
            }
        }
        self.bees.clear();
        self.node.stop();
    }
}
