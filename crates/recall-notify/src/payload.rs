use chrono::{DateTime, Utc};
use tracing::warn;

use recall_db::models::NoteRow;
use recall_push::ece::MAX_PAYLOAD_LEN;
use recall_types::push::{NotificationAction, NotificationData, NotificationPayload};

/// Longest body built from raw note content, marker included.
pub const PREVIEW_MAX_CHARS: usize = 120;
pub const TRUNCATION_MARKER: char = '…';

const TITLE: &str = "📝 Daily Note Reminder";
const ICON: &str = "/icon-192.svg";

/// Build the notification for `note`. The result owns all its data, so it
/// can be shared across every device of the user without touching the store.
pub fn build(note: &NoteRow, now: DateTime<Utc>) -> NotificationPayload {
    let body = match note.ai_summary.as_deref() {
        Some(summary) if !summary.trim().is_empty() => summary.to_string(),
        _ => preview(&note.content),
    };

    let payload = NotificationPayload {
        title: TITLE.to_string(),
        body,
        icon: ICON.to_string(),
        badge: ICON.to_string(),
        data: NotificationData {
            url: format!("/note/{}", note.id),
            note_id: note.id.clone(),
            timestamp: now,
        },
        actions: vec![
            NotificationAction {
                action: "open".to_string(),
                title: "Open Note".to_string(),
            },
            NotificationAction {
                action: "dismiss".to_string(),
                title: "Dismiss".to_string(),
            },
        ],
        require_interaction: false,
        silent: false,
    };

    // Summaries are sent verbatim; one this long fails encryption for
    // every device, so flag it before the fan-out.
    if exceeds_push_limit(&payload) {
        warn!(
            "Notification for note {} exceeds the {}-byte push limit and will not be delivered",
            note.id, MAX_PAYLOAD_LEN
        );
    }

    payload
}

/// Whether the serialized payload is too large for a single aes128gcm record.
pub fn exceeds_push_limit(payload: &NotificationPayload) -> bool {
    serde_json::to_vec(payload).map_or(true, |json| json.len() > MAX_PAYLOAD_LEN)
}

/// Content cut to `PREVIEW_MAX_CHARS` characters, ending in the marker only
/// when something was cut.
pub fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        return content.to_string();
    }

    let mut preview: String = content.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    preview.push(TRUNCATION_MARKER);
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str, summary: Option<&str>) -> NoteRow {
        NoteRow {
            id: "0b7c6a1e-3f55-4a8e-9a57-1f1f0c2d9e11".to_string(),
            user_id: "user".to_string(),
            content: content.to_string(),
            ai_summary: summary.map(str::to_string),
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
            updated_at: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn short_content_is_used_as_is() {
        let payload = build(&note("Borrow checker notes", None), Utc::now());
        assert_eq!(payload.body, "Borrow checker notes");
    }

    #[test]
    fn long_content_is_truncated_with_marker() {
        let content = "x".repeat(500);
        let body = preview(&content);
        assert_eq!(body.chars().count(), PREVIEW_MAX_CHARS);
        assert!(body.ends_with(TRUNCATION_MARKER));
        assert!(content.starts_with(body.trim_end_matches(TRUNCATION_MARKER)));
    }

    #[test]
    fn marker_appears_only_when_bound_is_exceeded() {
        for len in [0, 1, PREVIEW_MAX_CHARS - 1, PREVIEW_MAX_CHARS, PREVIEW_MAX_CHARS + 1, 1000] {
            let content = "a".repeat(len);
            let body = preview(&content);
            assert!(body.chars().count() <= PREVIEW_MAX_CHARS);
            assert_eq!(body.ends_with(TRUNCATION_MARKER), len > PREVIEW_MAX_CHARS, "len {len}");
        }
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let content = "ह".repeat(PREVIEW_MAX_CHARS + 5);
        let body = preview(&content);
        assert_eq!(body.chars().count(), PREVIEW_MAX_CHARS);
        assert!(body.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn summary_is_used_verbatim() {
        let summary = "S".repeat(300);
        let payload = build(&note("raw content", Some(&summary)), Utc::now());
        assert_eq!(payload.body, summary);
    }

    #[test]
    fn oversized_summary_is_kept_but_flagged() {
        let summary = "S".repeat(5000);
        let payload = build(&note("raw content", Some(&summary)), Utc::now());

        assert_eq!(payload.body, summary);
        assert!(exceeds_push_limit(&payload));
    }

    #[test]
    fn ordinary_payloads_fit() {
        let summary = "S".repeat(300);
        assert!(!exceeds_push_limit(&build(&note("raw content", Some(&summary)), Utc::now())));
        assert!(!exceeds_push_limit(&build(&note(&"x".repeat(5000), None), Utc::now())));
    }

    #[test]
    fn blank_summary_falls_back_to_content() {
        let payload = build(&note("raw content", Some("   ")), Utc::now());
        assert_eq!(payload.body, "raw content");
    }

    #[test]
    fn payload_links_back_to_note() {
        let n = note("content", None);
        let json = serde_json::to_value(build(&n, Utc::now())).unwrap();

        assert_eq!(json["data"]["noteId"], n.id.as_str());
        assert_eq!(json["data"]["url"], format!("/note/{}", n.id));
        assert_eq!(json["requireInteraction"], false);
        assert_eq!(json["actions"][0]["action"], "open");
        assert_eq!(json["actions"][1]["action"], "dismiss");
    }
}
