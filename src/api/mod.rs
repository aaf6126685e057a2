//! HTTP API — Axum server over the ledger and the betting engine.
//!
//! CORS enabled for the overlay and the control panel. Domain errors map to
//! status codes here and nowhere else; handlers just return `Result`.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::hub::Hub;
use crate::jobs::InMemoryPresence;
use crate::store::uow::UnitOfWork;
use crate::store::Database;
use crate::types::Error;

/// Shared state for all route handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub hub: Hub,
    pub presence: Arc<InMemoryPresence>,
}

impl AppState {
    pub fn new(db: Database, hub: Hub, presence: Arc<InMemoryPresence>) -> Self {
        Self { db, hub, presence }
    }

    /// Start the unit of work for one request.
    pub async fn begin(&self) -> crate::types::Result<UnitOfWork> {
        UnitOfWork::begin(self.db.pool(), self.hub.clone()).await
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "field": field, "message": message })),
            )
                .into_response(),
            // The conflicting round's current state is the response body,
            // so the caller can reconcile without a second request.
            Error::Conflict { game } => (StatusCode::CONFLICT, Json(game)).into_response(),
            Error::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": format!("{what} not found") })),
            )
                .into_response(),
            Error::Persistence(err) => {
                error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Betting rounds
        .route("/betting", post(routes::open_game).get(routes::latest_game))
        .route(
            "/betting/:id",
            get(routes::get_game).patch(routes::update_status),
        )
        .route("/betting/:id/bet", post(routes::place_bet))
        .route("/betting/:id/bets", get(routes::list_wagers))
        // Currency
        .route("/give/:twitch_id", post(routes::give))
        .route("/leaderboard", get(routes::leaderboard))
        .route("/transactions", get(routes::transactions))
        .route("/users/:twitch_id", get(routes::get_user))
        // Presence and redemptions
        .route("/presence/:twitch_id", post(routes::mark_present))
        .route("/stream", put(routes::set_stream_state))
        .route("/subscribers/:twitch_id", put(routes::set_subscriber))
        .route("/redemptions", post(routes::redeem))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the task is aborted.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "API server starting on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    axum::serve(listener, app).await.context("API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
