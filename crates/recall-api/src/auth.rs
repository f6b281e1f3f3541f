use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use recall_db::Database;
use recall_db::models::UserRow;
use recall_notify::{DailyNotifier, WebPushTransport};
use recall_types::api::{Claims, LoginRequest, MessageResponse, SignupRequest, TokenResponse, UserResponse};

use crate::summarizer::Summarizer;
use crate::{db_call, parse_id, parse_timestamp};

pub type AppState = Arc<AppStateInner>;

/// The production notifier: SQLite store, Web Push transport.
pub type Notifier = DailyNotifier<Database, WebPushTransport>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// None when no summarization key is configured.
    pub summarizer: Option<Summarizer>,
    /// None when VAPID keys are missing or invalid; push endpoints then
    /// report the subsystem as unavailable.
    pub notifier: Option<Arc<Notifier>>,
    /// Shared secret expected in `X-Trigger-Token`, if any.
    pub trigger_token: Option<String>,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();

    // Validate input
    if !is_plausible_email(&email) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if email is taken
    let lookup = email.clone();
    if db_call(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let user_id = Uuid::new_v4();

    let id = user_id.to_string();
    let stored_email = email.clone();
    db_call(&state, move |db| {
        db.create_user(
            &id,
            &stored_email,
            &password_hash,
            req.first_name.as_deref(),
            req.last_name.as_deref(),
        )
    })
    .await?;

    let token = create_token(&state.jwt_secret, state.token_ttl, user_id, &email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();
    let user = db_call(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if !user.is_active {
        return Err(StatusCode::FORBIDDEN);
    }

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = create_token(&state.jwt_secret, state.token_ttl, user_id, &user.email)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn me(Extension(user): Extension<UserRow>) -> Json<UserResponse> {
    Json(UserResponse {
        id: parse_id(&user.id, "user"),
        created_at: parse_timestamp(&user.created_at, "user"),
        updated_at: parse_timestamp(&user.updated_at, "user"),
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        is_active: user.is_active,
    })
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(Extension(_user): Extension<UserRow>) -> Json<MessageResponse> {
    Json(MessageResponse::new("Successfully logged out"))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace),
        None => false,
    }
}

pub fn create_token(
    secret: &str,
    ttl: chrono::Duration,
    user_id: Uuid,
    email: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Claims of a valid, unexpired HS256 token.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
