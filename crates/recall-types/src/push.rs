use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message handed to the browser's service worker. Field names follow the
/// `showNotification` options the worker passes straight through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
    pub silent: bool,
}

/// Deep-link target for the notification click handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub url: String,
    pub note_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}
