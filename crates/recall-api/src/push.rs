use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use recall_db::models::{NewSubscription, UserRow};
use recall_push::ece::SubscriptionKeys;
use recall_push::vapid::endpoint_origin;
use recall_types::api::{MessageResponse, SubscribeRequest, UnsubscribeRequest, VapidPublicKeyResponse};

use crate::auth::AppState;
use crate::db_call;

/// Key the browser needs for `pushManager.subscribe`. 503 while delivery
/// is not configured.
pub async fn vapid_public_key(
    State(state): State<AppState>,
) -> Result<Json<VapidPublicKeyResponse>, StatusCode> {
    let notifier = state.notifier.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(VapidPublicKeyResponse {
        public_key: notifier.transport().public_key().to_string(),
    }))
}

/// Register or refresh a device. Keyed by endpoint, so a browser that was
/// subscribed under another account now belongs to the caller.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if endpoint_origin(&req.endpoint).is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Reject keys now rather than on every daily run.
    if let Err(e) = SubscriptionKeys::from_base64(&req.keys.p256dh, &req.keys.auth) {
        warn!("Rejected subscription from user {}: {}", user.id, e);
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = Uuid::new_v4().to_string();
    let user_id = user.id.clone();
    let row = db_call(&state, move |db| {
        db.upsert_subscription(&NewSubscription {
            id: &id,
            user_id: &user_id,
            endpoint: &req.endpoint,
            p256dh_key: &req.keys.p256dh,
            auth_key: &req.keys.auth,
            user_agent: req.user_agent.as_deref(),
        })
    })
    .await?;

    info!("Stored push subscription {} for user {}", row.id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Subscribed to push notifications",
            "subscription_id": row.id,
        })),
    ))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(user): Extension<UserRow>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    let user_id = user.id.clone();
    let removed = db_call(&state, move |db| {
        db.delete_subscription_by_endpoint(&user_id, &req.endpoint)
    })
    .await?;

    if !removed {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("Removed push subscription for user {}", user.id);
    Ok(Json(MessageResponse::new("Unsubscribed from push notifications")))
}
