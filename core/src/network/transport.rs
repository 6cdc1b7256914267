//! HTTP implementation of openraft's `RaftNetwork`/`RaftNetworkFactory`,
//! grounded on the gRPC transport in `cbaugus-rust_loadtest/src/raft.rs`
//! (same three RPCs, same JSON-then-transport-envelope shape) but
//! carried over `reqwest` POSTs against the peer endpoints `network::raft`
//! exposes, matching the teacher's actix-web-based HTTP surface instead
//! of a gRPC one.

use std::time::Duration;

use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory as RaftNetworkFactoryTrait};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::{AnyError, BasicNode};

use crate::config::HiveConfig;
use crate::NodeId;

fn unreachable(msg: impl std::fmt::Display) -> Unreachable {
    Unreachable::new(&AnyError::error(msg.to_string()))
}

/// One peer's HTTP connection. Built lazily per target the first time
/// `ReplicatedNode` needs to reach it.
pub struct HttpNetwork {
    target_addr: String,
    client: reqwest::Client,
}

impl HttpNetwork {
    fn url(&self, path: &str) -> String {
        if self.target_addr.starts_with("http") {
            format!("{}{}", self.target_addr, path)
        } else {
            format!("http://{}{}", self.target_addr, path)
        }
    }

    async fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, Unreachable> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(unreachable)?;
        resp.json().await.map_err(unreachable)
    }
}

impl RaftNetwork<crate::TypeConfig> for HttpNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<crate::TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.post("/raft/append-entries", &rpc)
            .await
            .map_err(RPCError::Unreachable)
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.post("/raft/vote", &rpc).await.map_err(RPCError::Unreachable)
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<crate::TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        self.post("/raft/install-snapshot", &rpc)
            .await
            .map_err(|e| RPCError::Unreachable(e))
    }
}

/// Builds `HttpNetwork` instances per target peer, one per raft peer
/// task. Holds nothing but the static timeouts from `HiveConfig` — the
/// actual peer address comes from raft's own membership `BasicNode`.
#[derive(Clone)]
pub struct HttpNetworkFactory {
    client: reqwest::Client,
}

impl HttpNetworkFactory {
    pub fn new(cfg: &HiveConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.raft_elect_timeout())
            .connect_timeout(Duration::from_millis(500))
            .build()
            .expect("reqwest client builds with static config");
        Self { client }
    }
}

impl RaftNetworkFactoryTrait<crate::TypeConfig> for HttpNetworkFactory {
    type Network = HttpNetwork;

    async fn new_client(&mut self, _target: NodeId, node: &BasicNode) -> Self::Network {
        HttpNetwork { target_addr: node.addr.clone(), client: self.client.clone() }
    }
}
