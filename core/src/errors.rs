use thiserror::Error;

use crate::RequestId;

/// Error kinds per spec.md 7. Only `Transient` and `Application` are
/// recoverable by the caller; everything else is a consistency
/// violation or an I/O failure and is treated as fatal by whichever
/// task observes it.
#[derive(Error, Debug)]
pub enum BeehiveError {
    #[error("request {0} cancelled")]
    Cancelled(RequestId),

    #[error("node stopped")]
    Stopped,

    #[error("request timed out")]
    Timeout,

    #[error("application error: {0}")]
    Application(String),

    #[error("message maps to no cells")]
    EmptyClassification,

    #[error("cells span more than one bee, rejecting")]
    ClassificationConflict,

    #[error("cell already owned by another bee")]
    CellAlreadyOwned,

    #[error("no handler registered for this message type")]
    NoHandler,

    #[error("bee {0} not found")]
    UnknownBee(u64),

    #[error("raft error: {0}")]
    Raft(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode/decode error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BeehiveError>;
