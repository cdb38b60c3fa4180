use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// The single editable document: its text plus the timestamp the writer
/// stamped on the last successful save. `last_updated` stays `None` until
/// a first write has happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub text: String,
    #[serde(
        rename = "lastUpdated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("blob does not decode to a document: {0}")]
    Json(#[from] serde_json::Error),
}

impl Snapshot {
    /// Serializes to the stored wire form: JSON, then base64.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("snapshot serializes to JSON");
        STANDARD.encode(json)
    }

    /// Parses the stored wire form. The contents API line-wraps the
    /// base64 payload, so embedded whitespace is stripped first.
    pub fn decode(blob: &str) -> Result<Self, BlobError> {
        let compact: String = blob.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let json = STANDARD.decode(compact)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
