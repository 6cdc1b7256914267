//! A bee: the single task that owns a set of cells and serially
//! processes every message classified into them (spec.md 4.4). Grounds
//! the "sequential, no locks needed inside a handler" guarantee — a
//! bee only ever has one message in flight, enforced by draining its
//! own mailbox one item at a time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::app::{App, RcvContext};
use crate::cell::MappedCells;
use crate::node::ReplicatedNode;
use crate::store::BeehiveStateMachine;
use crate::{BeeId, Command};

pub(crate) struct Envelope {
    pub app: String,
    pub message_type: String,
    pub payload: Vec<u8>,
}

/// What `Hive` keeps for a live bee: its id, the cells it owns, and
/// the sending half of its mailbox. Never a back-pointer into the bee
/// task itself — looking a bee up always goes through this handle
/// (spec.md 9's registry-over-pointers resolution).
pub struct BeeHandle {
    pub id: BeeId,
    pub cells: MappedCells,
    pub(crate) mailbox: mpsc::Sender<Envelope>,
}

/// Runs until its mailbox is closed (i.e. the hive drops every
/// `BeeHandle` referencing it, which happens when the bee's cells are
/// unclaimed). One bee, one task, one mailbox.
pub struct Bee {
    id: BeeId,
    node: Arc<ReplicatedNode>,
    store: Arc<BeehiveStateMachine>,
    apps: Arc<DashMap<String, Arc<App>>>,
    mailbox: mpsc::Receiver<Envelope>,
}

impl Bee {
    pub(crate) fn spawn(
        id: BeeId,
        cells: MappedCells,
        node: Arc<ReplicatedNode>,
        store: Arc<BeehiveStateMachine>,
        apps: Arc<DashMap<String, Arc<App>>>,
        mailbox_capacity: usize,
    ) -> BeeHandle {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let bee = Bee { id, node, store, apps, mailbox: rx };
        tokio::spawn(bee.run());
        BeeHandle { id, cells, mailbox: tx }
    }

    async fn run(mut self) {
        let ctx = RcvContext::new(self.node.clone(), self.store.clone(), self.id);

        while let Some(Envelope { app, message_type, payload }) = self.mailbox.recv().await {
            let Some(app_handlers) = self.apps.get(&app) else {
                tracing::warn!(bee = self.id, app = %app, "no such app registered");
                continue;
            };
            let Some(handler) = app_handlers.handler_for(&message_type) else {
                tracing::warn!(bee = self.id, app = %app, message_type = %message_type, "no handler for message type");
                continue;
            };
            drop(app_handlers);

            if let Err(e) = handler.rcv(payload, &ctx).await {
                tracing::error!(bee = self.id, app = %app, message_type = %message_type, error = %e, "handler returned an error");
            }
        }

        tracing::debug!(bee = self.id, "mailbox closed, bee task exiting");
    }
}

/// Releases every cell this bee owned and drops its accumulated dict
/// state, once its mailbox has fully drained. Mirrors spec.md 3's
/// lifecycle: unclaim is a replicated command, the local drop is not.
pub(crate) async fn unclaim_and_forget(
    node: &ReplicatedNode,
    store: &BeehiveStateMachine,
    bee: BeeId,
    cells: &MappedCells,
) -> crate::errors::Result<()> {
    node.process(Command::UnclaimCells { cells: cells.clone() }).await?;
    crate::store::forget_bee(store, bee).await;
    Ok(())
}
