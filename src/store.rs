use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde_json::json;

use crate::{configuration::StoreSettings, error::StoreError, snapshot::Snapshot};

/// Opaque revision identifier owned by the remote store (the file's blob
/// sha). This service only ever echoes it back on conditional writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(String);

/// Client for the remote contents API holding the single document.
///
/// Stateless between calls: every operation is one or two independent
/// round trips, and concurrency control is entirely the store's
/// compare-and-swap on the version token.
pub struct ContentsStore {
    http: Client,
    endpoint: String,
    token: Secret<String>,
    commit_message: String,
}

#[derive(serde::Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

impl ContentsStore {
    pub fn new(settings: StoreSettings) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static("gitpad"));
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .expect("http client built");

        Self {
            http,
            endpoint: settings.endpoint,
            token: settings.token,
            commit_message: settings.commit_message,
        }
    }

    /// Retrieves the current document. The request asks intermediaries
    /// not to serve a cached copy, so every call observes the most
    /// recently written value.
    pub async fn fetch(&self) -> Result<Snapshot, StoreError> {
        let contents = self.get_contents().await?;
        let snapshot = Snapshot::decode(&contents.content)?;
        tracing::debug!(token = %contents.sha, "fetched snapshot");
        Ok(snapshot)
    }

    /// First half of a conditional write: captures the store's current
    /// version token. The returned [`PendingWrite`] must be committed to
    /// actually persist anything; another writer can still slip in
    /// between the two calls, in which case the commit fails with
    /// [`StoreError::WriteConflict`].
    pub async fn begin_write(&self) -> Result<PendingWrite<'_>, StoreError> {
        let contents = self.get_contents().await?;
        Ok(PendingWrite {
            store: self,
            token: VersionToken(contents.sha),
        })
    }

    async fn get_contents(&self) -> Result<ContentsResponse, StoreError> {
        let response = self
            .http
            .get(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::SnapshotMissing);
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        response.json().await.map_err(|e| {
            StoreError::CorruptSnapshot(format!("contents response was not valid JSON: {e}"))
        })
    }
}

/// A captured version token awaiting its conditional write. Splitting
/// token capture from the write keeps the race window between the two
/// round trips visible in the API.
pub struct PendingWrite<'a> {
    store: &'a ContentsStore,
    token: VersionToken,
}

impl PendingWrite<'_> {
    pub fn token(&self) -> &VersionToken {
        &self.token
    }

    /// Second half of the conditional write: replaces the stored blob,
    /// guarded by the captured token. The store either fully replaces
    /// the blob or leaves it untouched; a token mismatch surfaces as
    /// [`StoreError::WriteConflict`] and is never retried here.
    pub async fn commit(self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let response = self
            .store
            .http
            .put(&self.store.endpoint)
            .bearer_auth(self.store.token.expose_secret())
            .json(&json!({
                "message": self.store.commit_message,
                "content": snapshot.encode(),
                "sha": self.token.0,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(token = %self.token.0, "snapshot written");
            return Ok(());
        }
        match status {
            // The contents API reports a stale sha as 409 or 422.
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = remote_message(response).await;
                tracing::warn!(token = %self.token.0, %detail, "conditional write lost the race");
                Err(StoreError::WriteConflict { detail })
            }
            StatusCode::NOT_FOUND => Err(StoreError::SnapshotMissing),
            _ => Err(rejection(response).await),
        }
    }
}

async fn rejection(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let detail = remote_message(response).await;
    StoreError::RemoteRejected { status, detail }
}

/// Pulls the `message` field out of a remote error payload, falling back
/// to the raw body so no detail is ever dropped.
async fn remote_message(response: reqwest::Response) -> String {
    match response.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => "unknown remote error".to_string(),
    }
}
