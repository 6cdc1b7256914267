//! Application registration: `hive.new_app(name)` returns an `App`;
//! `App::handle` attaches a typed handler for one message shape
//! (spec.md 6's `Handle(messageType, handler)`).
//!
//! Handlers are generic over their own message type — the idiomatic
//! Rust reading of spec.md 9's guidance to replace the source's
//! reflective `Msg.Data()` with a closed, non-reflective shape. A
//! small type-erasure wrapper (`TypedHandler`) lets the hive keep one
//! object-safe registry of handlers for many different message types,
//! each decoded by a known codec id (here, `serde_json`) rather than
//! through `Any`/reflection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cell::MappedCells;
use crate::errors::{BeehiveError, Result};
use crate::node::ReplicatedNode;
use crate::store::BeehiveStateMachine;
use crate::{BeeId, NodeInfo};

/// Read-only context handed to `Handler::map`. The source's `MapContext`
/// exposes nothing that mutates state; this is intentionally empty for
/// now and exists as the seam future read-only lookups (e.g. current
/// membership) would hang off of.
pub struct MapContext {
    pub(crate) local_hive: NodeInfo,
}

impl MapContext {
    pub fn local_hive(&self) -> &NodeInfo {
        &self.local_hive
    }
}

/// Context handed to `Handler::rcv`: dictionary access scoped to the
/// bee processing the message, plus its id (spec.md 4.4).
pub struct RcvContext {
    node: Arc<ReplicatedNode>,
    store: Arc<BeehiveStateMachine>,
    bee: BeeId,
}

impl RcvContext {
    pub(crate) fn new(node: Arc<ReplicatedNode>, store: Arc<BeehiveStateMachine>, bee: BeeId) -> Self {
        Self { node, store, bee }
    }

    pub fn id(&self) -> BeeId {
        self.bee
    }

    pub fn dict(&self, name: impl Into<String>) -> crate::dict::DictHandle {
        crate::dict::DictHandle::new(self.node.clone(), self.store.clone(), self.bee, name)
    }

    /// `State().Dict(name)` from spec.md 4.4 — same handle as
    /// `dict(name)`, kept as a second accessor to match the two-name
    /// surface the spec documents.
    pub fn state(&self) -> &Self {
        self
    }
}

/// One application's handler for one message type: classify it into
/// cells, then process it once its owning bee has the cells.
#[async_trait]
pub trait Handler: Send + Sync {
    type Msg: DeserializeOwned + Serialize + Send + Sync + 'static;

    fn map(&self, msg: &Self::Msg, ctx: &MapContext) -> Option<MappedCells>;

    async fn rcv(&self, msg: Self::Msg, ctx: &RcvContext) -> anyhow::Result<()>;
}

#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn map(&self, payload: &[u8], ctx: &MapContext) -> Result<MappedCells>;
    async fn rcv(&self, payload: Vec<u8>, ctx: &RcvContext) -> Result<()>;
}

struct TypedHandler<H: Handler> {
    inner: H,
    _marker: PhantomData<H::Msg>,
}

#[async_trait]
impl<H: Handler> ErasedHandler for TypedHandler<H> {
    fn map(&self, payload: &[u8], ctx: &MapContext) -> Result<MappedCells> {
        let msg: H::Msg = serde_json::from_slice(payload)?;
        self.inner.map(&msg, ctx).ok_or(BeehiveError::EmptyClassification)
    }

    async fn rcv(&self, payload: Vec<u8>, ctx: &RcvContext) -> Result<()> {
        let msg: H::Msg = serde_json::from_slice(&payload)?;
        self.inner.rcv(msg, ctx).await.map_err(|e| BeehiveError::Application(e.to_string()))
    }
}

/// A named group of message-type handlers, created with
/// `Hive::new_app`.
#[derive(Default)]
pub struct App {
    pub name: String,
    pub(crate) handlers: DashMap<String, Arc<dyn ErasedHandler>>,
}

impl App {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), handlers: DashMap::new() }
    }

    /// Registers `handler` for messages tagged `message_type`. A
    /// second registration for the same tag replaces the first, the
    /// same way the source's `Handle` call does.
    pub fn handle<H: Handler + 'static>(&self, message_type: impl Into<String>, handler: H) {
        self.handlers.insert(
            message_type.into(),
            Arc::new(TypedHandler { inner: handler, _marker: PhantomData }),
        );
    }

    pub(crate) fn handler_for(&self, message_type: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.handlers.get(message_type).map(|h| h.clone())
    }
}
