//! HTTP surface: raft peer RPCs, cluster membership management, and
//! the application-facing emit endpoint. `transport` is the client
//! side (`HttpNetworkFactory`); the other modules are actix-web
//! handlers `serve` wires up, grounded on the teacher's
//! `start_example_raft_node` service list.

pub mod api;
pub mod management;
pub mod raft;
pub mod transport;

use std::sync::Arc;

use actix_web::middleware::{Compress, Logger};
use actix_web::web::Data;
use actix_web::HttpServer;

use crate::hive::Hive;

/// Binds and runs the HTTP server for `hive`. Does not return until
/// the server stops (bind error, or the process is killed) — callers
/// register every `App`/handler on `hive` before calling this.
pub async fn serve(hive: Arc<Hive>, addr: &str) -> anyhow::Result<()> {
    let data = Data::from(hive);

    let server = HttpServer::new(move || {
        actix_web::App::new()
            .wrap(Logger::default())
            .wrap(Compress::default())
            .app_data(data.clone())
            // raft peer RPC
            .service(raft::append_entries)
            .service(raft::vote)
            .service(raft::install_snapshot)
            // cluster membership
            .service(management::init)
            .service(management::add_learner)
            .service(management::add_node)
            .service(management::remove_node)
            .service(management::metrics)
            // application API
            .service(api::emit)
    });

    server.bind(addr)?.run().await?;
    Ok(())
}
