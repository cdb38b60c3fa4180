use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::{
    configuration::Settings, error::StoreError, snapshot::Snapshot, store::ContentsStore,
};

pub struct Application {
    listener: TcpListener,
    router: Router,
    port: u16,
}

#[derive(Clone)]
pub struct ApplicationState {
    store: Arc<ContentsStore>,
}

impl Application {
    pub async fn build(settings: Settings) -> Result<Self, std::io::Error> {
        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );

        let listener = TcpListener::bind(address).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let application_state = ApplicationState {
            store: Arc::new(ContentsStore::new(settings.store)),
        };

        let router = Router::new()
            .route("/api/load", get(load_snapshot))
            .route("/api/save", post(save_snapshot))
            // The editor must always observe the freshest state, so every
            // response forbids caching at all levels.
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::PRAGMA,
                HeaderValue::from_static("no-cache"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::EXPIRES,
                HeaderValue::from_static("0"),
            ))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::default().include_headers(true)),
            )
            .with_state(application_state);

        Ok(Self {
            listener,
            router,
            port,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("listening on {}", self.listener.local_addr().unwrap());
        axum::serve(self.listener, self.router.into_make_service()).await
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

async fn load_snapshot(
    State(state): State<ApplicationState>,
) -> Result<Json<Snapshot>, StoreError> {
    let snapshot = state.store.fetch().await.map_err(|e| {
        tracing::error!(error = %e, "failed to load snapshot");
        e
    })?;

    Ok(Json(snapshot))
}

async fn save_snapshot(
    State(state): State<ApplicationState>,
    Json(snapshot): Json<Snapshot>,
) -> Result<Json<Value>, StoreError> {
    let pending = state.store.begin_write().await.map_err(|e| {
        tracing::error!(error = %e, "failed to read version token before save");
        e
    })?;

    pending.commit(&snapshot).await.map_err(|e| {
        tracing::error!(error = %e, "failed to save snapshot");
        e
    })?;

    Ok(Json(json!({ "message": "saved" })))
}
