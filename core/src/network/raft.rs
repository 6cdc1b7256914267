//! Raft peer-to-peer RPC endpoints: the HTTP side of
//! `transport::HttpNetwork`. One hive's `HttpNetwork` POSTs here against
//! another hive's actix-web server.

use actix_web::post;
use actix_web::web::{Data, Json};
use actix_web::Responder;

use crate::hive::Hive;

#[post("/raft/append-entries")]
pub async fn append_entries(
    hive: Data<Hive>,
    req: Json<openraft::raft::AppendEntriesRequest<crate::TypeConfig>>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.raft.append_entries(req.0).await;
    Ok(Json(res))
}

#[post("/raft/vote")]
pub async fn vote(
    hive: Data<Hive>,
    req: Json<openraft::raft::VoteRequest<crate::NodeId>>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.raft.vote(req.0).await;
    Ok(Json(res))
}

#[post("/raft/install-snapshot")]
pub async fn install_snapshot(
    hive: Data<Hive>,
    req: Json<openraft::raft::InstallSnapshotRequest<crate::TypeConfig>>,
) -> actix_web::Result<impl Responder> {
    let res = hive.node.raft.install_snapshot(req.0).await;
    Ok(Json(res))
}
