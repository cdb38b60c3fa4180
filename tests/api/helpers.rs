use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::Lazy;
use secrecy::Secret;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use gitpad::configuration::get_configuration;
use gitpad::snapshot::Snapshot;
use gitpad::startup::Application;
use gitpad::telemetry::{get_subscriber, init_subscriber};

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber();
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
    pub store: FakeStore,
}

impl TestApp {
    pub async fn load(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api/load", self.address))
            .send()
            .await
            .expect("load request sent")
    }

    pub async fn save(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/save", self.address))
            .json(body)
            .send()
            .await
            .expect("save request sent")
    }
}

pub async fn spawn_app() -> TestApp {
    // Only initialize tracer once instead of every test
    Lazy::force(&TRACING);

    let store = FakeStore::spawn().await;

    let settings = {
        let mut c = get_configuration().expect("configuration fetched");
        c.application.port = 0;
        c.store.endpoint = store.endpoint();
        c.store.token = Secret::new("test-token".to_string());
        c
    };

    let application = Application::build(settings)
        .await
        .expect("application built");
    let application_port = application.port();
    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address: format!("http://localhost:{}", application_port),
        port: application_port,
        api_client: reqwest::Client::new(),
        store,
    }
}

#[derive(Default)]
struct FakeStoreState {
    file: Option<StoredFile>,
    /// When set, reads report this sha instead of the real one. Lets a
    /// test make the token captured before a write go stale.
    advertised_sha: Option<String>,
    fail_reads_with: Option<(u16, String)>,
    fail_writes_with: Option<(u16, String)>,
    put_attempts: usize,
}

struct StoredFile {
    content: String,
    sha: String,
}

/// In-process stand-in for the remote contents API: one file, read via
/// GET and replaced via sha-guarded PUT.
pub struct FakeStore {
    url: String,
    state: Arc<Mutex<FakeStoreState>>,
}

impl FakeStore {
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(FakeStoreState::default()));
        let router = Router::new()
            .route(
                "/contents/data.json",
                get(get_contents).put(put_contents),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("store listener bound");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("fake store served");
        });

        Self {
            url: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/contents/data.json", self.url)
    }

    /// Seeds the stored file with an encoded snapshot; returns its sha.
    pub fn seed_document(&self, snapshot: &Snapshot) -> String {
        self.seed_blob(&snapshot.encode())
    }

    /// Seeds the stored file with a raw blob, valid or not.
    pub fn seed_blob(&self, blob: &str) -> String {
        let sha = new_sha();
        let mut state = self.state.lock().unwrap();
        state.file = Some(StoredFile {
            content: blob.to_string(),
            sha: sha.clone(),
        });
        sha
    }

    pub fn stored_blob(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.file.as_ref().map(|f| f.content.clone())
    }

    pub fn stored_snapshot(&self) -> Option<Snapshot> {
        self.stored_blob()
            .map(|blob| Snapshot::decode(&blob).expect("stored blob decoded"))
    }

    pub fn current_sha(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.file.as_ref().map(|f| f.sha.clone())
    }

    pub fn advertise_stale_sha(&self) {
        let mut state = self.state.lock().unwrap();
        state.advertised_sha = Some(new_sha());
    }

    pub fn fail_reads_with(&self, status: u16, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_reads_with = Some((status, message.to_string()));
    }

    pub fn fail_writes_with(&self, status: u16, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_writes_with = Some((status, message.to_string()));
    }

    pub fn put_attempts(&self) -> usize {
        self.state.lock().unwrap().put_attempts
    }
}

fn new_sha() -> String {
    Uuid::new_v4().simple().to_string()
}

fn error_response(status: u16, message: &str) -> Response {
    (
        StatusCode::from_u16(status).expect("valid status code"),
        Json(json!({ "message": message })),
    )
        .into_response()
}

async fn get_contents(State(state): State<Arc<Mutex<FakeStoreState>>>) -> Response {
    let state = state.lock().unwrap();
    if let Some((status, message)) = &state.fail_reads_with {
        return error_response(*status, message);
    }
    match &state.file {
        Some(file) => {
            let sha = state.advertised_sha.as_ref().unwrap_or(&file.sha);
            Json(json!({ "content": file.content, "sha": sha })).into_response()
        }
        None => error_response(404, "Not Found"),
    }
}

async fn put_contents(
    State(state): State<Arc<Mutex<FakeStoreState>>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.put_attempts += 1;
    if let Some((status, message)) = state.fail_writes_with.clone() {
        return error_response(status, &message);
    }
    let Some(file) = &mut state.file else {
        return error_response(404, "Not Found");
    };

    let submitted_sha = body.get("sha").and_then(|s| s.as_str()).unwrap_or_default();
    if submitted_sha != file.sha {
        return error_response(409, "data.json does not match the expected sha");
    }

    file.content = body
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();
    file.sha = new_sha();

    Json(json!({ "content": { "sha": file.sha } })).into_response()
}
