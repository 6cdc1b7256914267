pub mod app;
pub mod bee;
pub mod cell;
pub mod config;
pub mod dict;
pub mod errors;
pub mod hive;
pub mod log_store;
pub mod network;
pub mod node;
pub mod request_line;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

use cell::MappedCells;

pub type NodeId = u64;
pub type BeeId = u64;
pub type Raft = openraft::Raft<TypeConfig>;
pub type LogStore = log_store::LogStore;

/// Identifies a hive: its raft node id and the address other hives use
/// to reach it. Encoded into the raft peer context so membership
/// changes carry connection info, per the cell-ownership protocol.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub id: NodeId,
    pub addr: String,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Globally unique proposal identifier: `(NodeID, Seq)`. The sequence
/// generator is monotonic per node and, on restart, seeded above
/// `last_log_index + 2*snap_count` to avoid colliding with in-flight
/// requests from a prior incarnation.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    pub node_id: NodeId,
    pub seq: u64,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.seq)
    }
}

/// Mutations proposed against the replicated state machine. `ClaimCells`/
/// `UnclaimCells` implement the cell-ownership half of the store;
/// `DictPut`/`DictDel` the per-bee dictionary half. Both travel inside
/// one `Request` so a single commit can be awaited through the same
/// `RequestLine` slot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Command {
    ClaimCells { cells: MappedCells, bee: BeeId, owner: NodeInfo },
    UnclaimCells { cells: MappedCells },
    DictPut { bee: BeeId, dict: String, key: Vec<u8>, value: Vec<u8> },
    DictDel { bee: BeeId, dict: String, key: Vec<u8> },
    /// Records that a conf change has removed `node`, once
    /// `change_membership` for it has already committed. Replicated
    /// like any other mutation so every member (and a restarted one,
    /// via snapshot) agrees on who was removed (spec.md 4.3).
    MarkRemoved { node: NodeId },
}

/// An opaque proposal, encoded to bytes before being handed to raft;
/// decoding a committed entry back into `Request` is the node's
/// contract with the store (spec.md 3).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub data: Option<Command>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum CommandResult {
    Claimed,
    Unclaimed,
    Put { prev: Option<Vec<u8>> },
    Deleted { existed: bool },
    Removed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub id: RequestId,
    pub data: Option<CommandResult>,
    pub err: Option<String>,
}

impl Response {
    pub fn empty(id: RequestId) -> Self {
        Self { id, data: None, err: None }
    }

    pub fn ok(id: RequestId, data: CommandResult) -> Self {
        Self { id, data: Some(data), err: None }
    }

    pub fn error(id: RequestId, err: impl fmt::Display) -> Self {
        Self { id, data: None, err: Some(err.to_string()) }
    }
}

pub mod typ {
    use crate::NodeId;
    use openraft::BasicNode;

    pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<NodeId, E>;
    pub type RPCError<E = openraft::error::Infallible> =
        openraft::error::RPCError<NodeId, BasicNode, RaftError<E>>;

    pub type ClientWriteError = openraft::error::ClientWriteError<NodeId, BasicNode>;
    pub type CheckIsLeaderError = openraft::error::CheckIsLeaderError<NodeId, BasicNode>;
    pub type ForwardToLeader = openraft::error::ForwardToLeader<NodeId, BasicNode>;
    pub type InitializeError = openraft::error::InitializeError<NodeId, BasicNode>;

    pub type ClientWriteResponse = openraft::raft::ClientWriteResponse<crate::TypeConfig>;
}

openraft::declare_raft_types!(
    /// Type configuration for the beehive replicated log: `D` is the
    /// encoded `Request`, `R` its committed `Response`.
    pub TypeConfig:
        D = Request,
        R = Response,
);
