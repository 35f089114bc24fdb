use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use locus_core::classify::Intent;
use locus_core::pipeline::Pipeline;
use locus_core::shape::Answer;
use locus_core::store::RecordStore;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides [server].bind)
    #[arg(long)]
    pub bind: Option<String>,

    /// Database path (overrides [store].path)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

/// Shared by every request; the pipeline holds no per-request state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn RecordStore>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub response: Answer,
    pub intent: Option<Intent>,
}

/// Handler failure rendered as `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub async fn run(args: ServeArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let db_path = super::resolve_db_path(&config, args.db);
    let store = super::open_store(&db_path)?;
    let pipeline = super::build_pipeline(&config, Arc::clone(&store))?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        store,
    };
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Cannot bind {bind}"))?;
    info!(%bind, db = %db_path.display(), "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shutdown complete");
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/outlets", get(outlets))
        .route("/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello from Locus" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn outlets(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let outlets = state.store.list_outlets().await.map_err(|e| {
        error!(error = %e, "Listing outlets failed");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    })?;
    Ok(Json(json!({ "data": outlets })))
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatResponse> {
    let response = state.pipeline.handle(&req.text).await;
    Json(ChatResponse {
        message: req.text,
        response: response.answer,
        intent: response.intent,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        () = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use locus_test::{FixtureStore, StubGenerator, StubScorer, pipeline_with};

    use super::*;

    fn state(fixture: &FixtureStore, scorer: StubScorer, generator: StubGenerator) -> AppState {
        let store = fixture.store();
        AppState {
            pipeline: Arc::new(pipeline_with(scorer, generator, Arc::clone(&store))),
            store,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_and_root_respond() {
        let fixture = FixtureStore::new();
        let app = router(state(
            &fixture,
            StubScorer::always_chat(),
            StubGenerator::replying("hi"),
        ));

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");

        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn outlets_are_wrapped_in_data() {
        let fixture = FixtureStore::new();
        let app = router(state(
            &fixture,
            StubScorer::always_chat(),
            StubGenerator::replying("hi"),
        ));

        let resp = app
            .oneshot(Request::get("/outlets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(resp).await;
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), fixture.outlets().len());
        assert_eq!(data[0]["outlet_name"], fixture.outlets()[0].outlet_name);
    }

    #[tokio::test]
    async fn chat_echoes_message_and_answer() {
        let fixture = FixtureStore::new();
        let app = router(state(
            &fixture,
            StubScorer::always_chat(),
            StubGenerator::replying("Hello! How can I help?"),
        ));

        let req = Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"text":"hello there"}"#))
            .unwrap();
        let body = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(body["message"], "hello there");
        assert_eq!(body["intent"], "conversational_chat");
        assert_eq!(body["response"]["kind"], "reply");
        assert_eq!(body["response"]["value"], "Hello! How can I help?");
    }
}
