pub mod auth;
pub mod middleware;
pub mod notebooks;
pub mod notes;
pub mod notifications;
pub mod push;
pub mod summarizer;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{error, warn};
use uuid::Uuid;

use recall_db::Database;

use crate::auth::AppState;

/// Every route the API serves. Layers that depend on deployment (CORS,
/// tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/push/vapid-public-key", get(push::vapid_public_key))
        .route("/api/notifications/trigger", post(notifications::trigger))
        .route("/api/notifications/status", get(notifications::status));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/api/notes/{note_id}",
            get(notes::get_note).put(notes::update_note).delete(notes::delete_note),
        )
        .route("/api/search", get(notes::search_notes))
        .route(
            "/api/notebooks",
            get(notebooks::list_notebooks).post(notebooks::create_notebook),
        )
        .route(
            "/api/notebooks/{notebook_id}",
            get(notebooks::get_notebook)
                .put(notebooks::rename_notebook)
                .delete(notebooks::delete_notebook),
        )
        .route("/api/notebooks/{notebook_id}/notes", get(notebooks::notebook_notes))
        .route(
            "/api/notebooks/{notebook_id}/notes/{note_id}",
            post(notebooks::add_note).delete(notebooks::remove_note),
        )
        .route("/api/push/subscribe", post(push::subscribe))
        .route("/api/push/unsubscribe", post(push::unsubscribe))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Recall API is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(state.db.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, what: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by older tooling use SQLite's CURRENT_TIMESTAMP form.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, what, e);
            DateTime::default()
        })
}
