use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use recall_notify::{RunReport, selector};
use recall_types::api::{NotificationStatusResponse, TriggerResponse};

use crate::auth::AppState;

pub const TRIGGER_TOKEN_HEADER: &str = "x-trigger-token";

/// Run one daily batch now. Meant for an external scheduler; calling it more
/// than once a day re-sends the same notes.
pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<TriggerResponse>) {
    if let Some(expected) = state.trigger_token.as_deref() {
        let given = headers
            .get(TRIGGER_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if !token_matches(given, expected) {
            warn!("Rejected notification trigger with missing or wrong token");
            return failure(StatusCode::UNAUTHORIZED, "invalid trigger token");
        }
    }

    let Some(notifier) = state.notifier.clone() else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "push delivery is not configured");
    };

    // Spawned so a panic inside the run still produces a tagged response.
    match tokio::spawn(async move { notifier.run_once().await }).await {
        Ok(Ok(report)) => (StatusCode::OK, Json(success(report))),
        Ok(Err(e)) => {
            error!("Daily notification run failed: {:#}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, &format!("{:#}", e))
        }
        Err(e) => {
            error!("Daily notification run aborted: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "notification run aborted")
        }
    }
}

/// Compares fixed-length digests so the time taken does not depend on how
/// much of the token was right.
fn token_matches(given: Option<&str>, expected: &str) -> bool {
    let Some(given) = given else {
        return false;
    };

    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());

    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub async fn status(State(state): State<AppState>) -> Json<NotificationStatusResponse> {
    let now = selector::reference_now();
    Json(NotificationStatusResponse {
        delivery_configured: state.notifier.is_some(),
        timezone: selector::REFERENCE_TIMEZONE.to_string(),
        current_time: now.to_rfc3339(),
        day_of_year: selector::day_of_year(now.date_naive()),
    })
}

fn success(report: RunReport) -> TriggerResponse {
    TriggerResponse::Success {
        users_processed: report.users_processed,
        notifications_sent: report.notifications_sent,
        users_skipped: report.users_skipped,
        users_failed: report.users_failed,
        subscriptions_removed: report.subscriptions_removed,
        day_of_year: report.day_of_year,
    }
}

fn failure(status: StatusCode, error: &str) -> (StatusCode, Json<TriggerResponse>) {
    (
        status,
        Json(TriggerResponse::Error {
            error: error.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_must_match_exactly() {
        assert!(token_matches(Some("s3cret"), "s3cret"));

        assert!(!token_matches(None, "s3cret"));
        assert!(!token_matches(Some(""), "s3cret"));
        assert!(!token_matches(Some("s3cre"), "s3cret"));
        assert!(!token_matches(Some("s3cret "), "s3cret"));
        assert!(!token_matches(Some("S3CRET"), "s3cret"));
    }
}
