use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::snapshot::BlobError;

/// Failure taxonomy of the save/load protocol. Nothing here is retried
/// or recovered internally; every variant is surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure, no response from the remote store.
    #[error("remote store unreachable: {0}")]
    RemoteUnavailable(#[from] reqwest::Error),
    /// The remote responded with a non-success status outside the
    /// conflict/missing cases; detail is passed through verbatim.
    #[error("remote store rejected the request (status {status}): {detail}")]
    RemoteRejected { status: u16, detail: String },
    /// The stored blob did not decode into a document.
    #[error("stored snapshot could not be decoded: {0}")]
    CorruptSnapshot(String),
    /// The fixed key does not exist; this protocol never creates it.
    #[error("no document exists at the configured store key")]
    SnapshotMissing,
    /// The version token captured before the write no longer matched the
    /// store's current token when the write landed.
    #[error("document changed between reading its version and writing: {detail}")]
    WriteConflict { detail: String },
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteUnavailable(_) => "remote_unavailable",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::CorruptSnapshot(_) => "corrupt_snapshot",
            Self::SnapshotMissing => "snapshot_missing",
            Self::WriteConflict { .. } => "write_conflict",
        }
    }
}

impl From<BlobError> for StoreError {
    fn from(e: BlobError) -> Self {
        Self::CorruptSnapshot(e.to_string())
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::SnapshotMissing => StatusCode::NOT_FOUND,
            Self::WriteConflict { .. } => StatusCode::CONFLICT,
            Self::RemoteUnavailable(_)
            | Self::RemoteRejected { .. }
            | Self::CorruptSnapshot(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({
            "error": self.kind(),
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}
