use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims issued by `/api/auth/*` and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Notes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNoteRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateNoteRequest {
    pub content: String,
    #[serde(default)]
    pub regenerate_summary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteResponse {
    pub id: Uuid,
    pub content: String,
    pub ai_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub notes: Vec<NoteResponse>,
    pub total_count: usize,
}

// -- Notebooks --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotebookRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotebookResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub note_count: u32,
}

#[derive(Debug, Serialize)]
pub struct NotebookWithNotesResponse {
    #[serde(flatten)]
    pub notebook: NotebookResponse,
    pub notes: Vec<NoteResponse>,
}

// -- Push subscriptions --

/// Body of `PushSubscription.toJSON()` as sent by the browser, plus an
/// optional device descriptor.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VapidPublicKeyResponse {
    pub public_key: String,
}

// -- Daily notifications --

/// Result of one trigger invocation. Always serialized with a `status` tag
/// so external schedulers can branch on it without parsing the rest.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TriggerResponse {
    Success {
        users_processed: usize,
        notifications_sent: usize,
        users_skipped: usize,
        users_failed: usize,
        subscriptions_removed: usize,
        day_of_year: u32,
    },
    Error {
        error: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationStatusResponse {
    pub delivery_configured: bool,
    pub timezone: String,
    pub current_time: String,
    pub day_of_year: u32,
}
