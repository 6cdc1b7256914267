//! Cluster membership endpoints: initialize a new cluster, add a
//! learner, promote/remove a voter, and read raft metrics. Grounded on
//! the conf-change surface `ReplicatedNode` exposes (spec.md 4.3).

use std::collections::BTreeMap;

use actix_web::{get, post};
use actix_web::web::{Data, Json};
use actix_web::Responder;
use openraft::BasicNode;
use serde::{Deserialize, Serialize};

use crate::hive::Hive;
use crate::NodeInfo;

#[derive(Deserialize)]
pub struct InitRequest {
    pub members: Vec<NodeInfo>,
}

#[post("/cluster/init")]
pub async fn init(hive: Data<Hive>, req: Json<InitRequest>) -> actix_web::Result<impl Responder> {
    let members: BTreeMap<_, _> = req
        .0
        .members
        .into_iter()
        .map(|n| (n.id, BasicNode { addr: n.addr }))
        .collect();
    let res = hive.node.raft.initialize(members).await;
    Ok(Json(res.map_err(|e| e.to_string())))
}

#[derive(Deserialize)]
pub struct MembershipRequest {
    pub node: NodeInfo,
}

#[post("/cluster/add-learner")]
pub async fn add_learner(
    hive: Data<Hive>,
    req: Json<MembershipRequest>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.add_learner(req.0.node).await;
    Ok(Json(res.map_err(|e| e.to_string())))
}

#[post("/cluster/add-node")]
pub async fn add_node(
    hive: Data<Hive>,
    req: Json<MembershipRequest>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.add_node(req.0.node).await;
    Ok(Json(res.map_err(|e| e.to_string())))
}

#[post("/cluster/remove-node")]
pub async fn remove_node(
    hive: Data<Hive>,
    req: Json<MembershipRequest>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.remove_node(req.0.node).await;
    Ok(Json(res.map_err(|e| e.to_string())))
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub id: crate::NodeId,
    pub current_leader: Option<crate::NodeId>,
    pub last_log_index: Option<u64>,
    pub last_applied: Option<u64>,
    pub pending_requests: usize,
}

#[get("/cluster/metrics")]
pub async fn metrics(hive: Data<Hive>) -> actix_web::Result<impl Responder> {
    let m = hive.node.raft.metrics().borrow().clone();
    Ok(Json(MetricsResponse {
        id: hive.node.id,
        current_leader: m.current_leader,
        last_log_index: m.last_log_index,
        last_applied: m.last_applied.map(|l| l.index),
        pending_requests: hive.node.pending_requests(),
    }))
}
