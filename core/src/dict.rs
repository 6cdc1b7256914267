//! A named key/value map scoped to one bee (spec.md 4.4). Mutations
//! are proposed through the `ReplicatedNode`; a handler's own reads
//! are served straight from the local store, since per-bee mailbox
//! serialization already guarantees the handler sees every mutation
//! it has already awaited committed.

use std::sync::Arc;

use crate::errors::Result;
use crate::node::ReplicatedNode;
use crate::store::BeehiveStateMachine;
use crate::{BeeId, Command, CommandResult};

pub struct DictHandle {
    node: Arc<ReplicatedNode>,
    store: Arc<BeehiveStateMachine>,
    bee: BeeId,
    name: String,
}

impl DictHandle {
    pub(crate) fn new(
        node: Arc<ReplicatedNode>,
        store: Arc<BeehiveStateMachine>,
        bee: BeeId,
        name: impl Into<String>,
    ) -> Self {
        Self { node, store, bee, name: name.into() }
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.store.get(self.bee, &self.name, key.as_ref()).await
    }

    pub async fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let cmd = Command::DictPut {
            bee: self.bee,
            dict: self.name.clone(),
            key: key.into(),
            value: value.into(),
        };
        match self.node.process(cmd).await?.data {
            Some(CommandResult::Put { prev }) => Ok(prev),
            _ => Ok(None),
        }
    }

    pub async fn del(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let cmd =
            Command::DictDel { bee: self.bee, dict: self.name.clone(), key: key.as_ref().to_vec() };
        match self.node.process(cmd).await?.data {
            Some(CommandResult::Deleted { existed }) => Ok(existed),
            _ => Ok(false),
        }
    }
}
