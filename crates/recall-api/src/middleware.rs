use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

use crate::auth::{AppState, verify_token};
use crate::db_call;

/// Extract and validate the JWT from the Authorization header, then load the
/// user it names. The `UserRow` is inserted as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;

    // Deleted users keep valid-looking tokens until they expire.
    let user_id = claims.sub.to_string();
    let user = db_call(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !user.is_active {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
