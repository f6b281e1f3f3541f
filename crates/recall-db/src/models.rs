/// Row types as stored in SQLite.
/// Distinct from recall-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub ai_summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NotebookRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub note_count: u32,
}

/// One browser/device registration. The key material is stored exactly as
/// the browser reported it (base64url) and only interpreted by the push layer.
#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to create or refresh a subscription.
pub struct NewSubscription<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub endpoint: &'a str,
    pub p256dh_key: &'a str,
    pub auth_key: &'a str,
    pub user_agent: Option<&'a str>,
}
