//! Application-facing surface: emitting a message into the hive mesh,
//! and a couple of read-only debug endpoints. Replaces the teacher's
//! `/write`, `/del`, `/read`, `/consistent_read` key/value handlers with
//! Beehive's single `Emit` entry point (spec.md 4.4) — ownership and
//! dispatch decide where the message actually lands, not the caller.

use actix_web::post;
use actix_web::web::{Data, Json};
use actix_web::Responder;
use serde::{Deserialize, Serialize};

use crate::hive::Hive;

#[derive(Deserialize)]
pub struct EmitRequest {
    pub app: String,
    pub message_type: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
pub struct EmitResponse {
    pub accepted: bool,
    pub error: Option<String>,
}

/// Entry point other hives (and external callers) use to deliver a
/// message. Fire-and-forget per spec.md 4.4 — the response only
/// reports whether the message was accepted for processing, not
/// whether `Rcv` has run yet.
#[post("/emit")]
pub async fn emit(hive: Data<Hive>, req: Json<EmitRequest>) -> actix_web::Result<impl Responder> {
    let EmitRequest { app, message_type, payload } = req.0;
    let payload = match serde_json::to_vec(&payload) {
        Ok(p) => p,
        Err(e) => return Ok(Json(EmitResponse { accepted: false, error: Some(e.to_string()) })),
    };

    match hive.dispatch_raw(&app, &message_type, payload).await {
        Ok(()) => Ok(Json(EmitResponse { accepted: true, error: None })),
        Err(e) => Ok(Json(EmitResponse { accepted: false, error: Some(e.to_string()) })),
    }
}
