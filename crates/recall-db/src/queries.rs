use crate::models::{NewSubscription, NoteRow, NotebookRow, SubscriptionRow, UserRow};
use crate::{Database, timestamp_now};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, is_active, created_at, updated_at";
const NOTE_COLUMNS: &str = "id, user_id, content, ai_summary, created_at, updated_at";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, endpoint, p256dh_key, auth_key, user_agent, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, email, password_hash, first_name, last_name, now],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, active, now],
            )?;
            Ok(changed > 0)
        })
    }

    /// Active users owning at least one note: the population of a daily run.
    pub fn active_users_with_notes(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.is_active = 1
                   AND EXISTS (SELECT 1 FROM notes n WHERE n.user_id = u.id)
                 ORDER BY u.created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notes --

    pub fn insert_note(&self, id: &str, user_id: &str, content: &str) -> Result<NoteRow> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, user_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, user_id, content, now],
            )?;
            Ok(NoteRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                content: content.to_string(),
                ai_summary: None,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_note(&self, id: &str, user_id: &str) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| query_note(conn, id, user_id))
    }

    /// Newest first, for the note list screen.
    pub fn list_notes(&self, user_id: &str, skip: u32, limit: u32) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, skip], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All of a user's notes, oldest first. Insertion order breaks ties so
    /// repeated calls always return the same sequence.
    pub fn notes_for_user_oldest_first(&self, user_id: &str) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([user_id], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_note_content(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Option<NoteRow>> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notes SET content = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id, content, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_note(conn, id, user_id)
        })
    }

    /// Store a generated summary. Returns false if the note was deleted meanwhile.
    pub fn set_note_summary(&self, id: &str, summary: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notes SET ai_summary = ?2 WHERE id = ?1",
                rusqlite::params![id, summary],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_note(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Case-insensitive substring match over content and summary.
    pub fn search_notes(&self, user_id: &str, term: &str) -> Result<Vec<NoteRow>> {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE user_id = ?1
                   AND (lower(content) LIKE ?2 ESCAPE '\\'
                        OR lower(coalesce(ai_summary, '')) LIKE ?2 ESCAPE '\\')
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, pattern], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notebooks --

    pub fn create_notebook(&self, id: &str, user_id: &str, title: &str) -> Result<NotebookRow> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notebooks (id, user_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, user_id, title, now],
            )?;
            Ok(NotebookRow {
                id: id.to_string(),
                user_id: user_id.to_string(),
                title: title.to_string(),
                created_at: now.clone(),
                updated_at: now,
                note_count: 0,
            })
        })
    }

    pub fn list_notebooks(&self, user_id: &str) -> Result<Vec<NotebookRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT nb.id, nb.user_id, nb.title, nb.created_at, nb.updated_at, COUNT(nn.note_id)
                 FROM notebooks nb
                 LEFT JOIN note_notebooks nn ON nn.notebook_id = nb.id
                 WHERE nb.user_id = ?1
                 GROUP BY nb.id
                 ORDER BY nb.created_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id], notebook_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_notebook(&self, id: &str, user_id: &str) -> Result<Option<NotebookRow>> {
        self.with_conn(|conn| query_notebook(conn, id, user_id))
    }

    pub fn rename_notebook(&self, id: &str, user_id: &str, title: &str) -> Result<Option<NotebookRow>> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notebooks SET title = ?3, updated_at = ?4 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id, title, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_notebook(conn, id, user_id)
        })
    }

    /// Deletes the notebook and its note associations; the notes themselves stay.
    pub fn delete_notebook(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM notebooks WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn notebook_notes(&self, notebook_id: &str) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.user_id, n.content, n.ai_summary, n.created_at, n.updated_at
                 FROM notes n
                 JOIN note_notebooks nn ON nn.note_id = n.id
                 WHERE nn.notebook_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC",
            )?;
            let rows = stmt
                .query_map([notebook_id], note_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns true if the association was created, false if it already existed.
    pub fn add_note_to_notebook(&self, notebook_id: &str, note_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO note_notebooks (note_id, notebook_id) VALUES (?1, ?2)",
                [note_id, notebook_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if an association was removed.
    pub fn remove_note_from_notebook(&self, notebook_id: &str, note_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM note_notebooks WHERE note_id = ?1 AND notebook_id = ?2",
                [note_id, notebook_id],
            )?;
            Ok(removed > 0)
        })
    }

    // -- Push subscriptions --

    /// Insert or refresh a subscription keyed by endpoint. A browser that
    /// re-subscribes under a different account moves the row to that account.
    pub fn upsert_subscription(&self, sub: &NewSubscription<'_>) -> Result<SubscriptionRow> {
        let now = timestamp_now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions
                     (id, user_id, endpoint, p256dh_key, auth_key, user_agent, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(endpoint) DO UPDATE SET
                     user_id = excluded.user_id,
                     p256dh_key = excluded.p256dh_key,
                     auth_key = excluded.auth_key,
                     user_agent = excluded.user_agent,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    sub.id,
                    sub.user_id,
                    sub.endpoint,
                    sub.p256dh_key,
                    sub.auth_key,
                    sub.user_agent,
                    now
                ],
            )?;

            let row = conn.query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions WHERE endpoint = ?1"),
                [sub.endpoint],
                subscription_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM push_subscriptions
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([user_id], subscription_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when the row was already gone; callers treat that as success.
    pub fn delete_subscription(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM push_subscriptions WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    pub fn delete_subscription_by_endpoint(&self, user_id: &str, endpoint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
                [user_id, endpoint],
            )?;
            Ok(removed > 0)
        })
    }
}

fn query_note(conn: &Connection, id: &str, user_id: &str) -> Result<Option<NoteRow>> {
    conn.query_row(
        &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1 AND user_id = ?2"),
        [id, user_id],
        note_from_row,
    )
    .optional()
}

fn query_notebook(conn: &Connection, id: &str, user_id: &str) -> Result<Option<NotebookRow>> {
    conn.query_row(
        "SELECT nb.id, nb.user_id, nb.title, nb.created_at, nb.updated_at, COUNT(nn.note_id)
         FROM notebooks nb
         LEFT JOIN note_notebooks nn ON nn.notebook_id = nb.id
         WHERE nb.id = ?1 AND nb.user_id = ?2
         GROUP BY nb.id",
        [id, user_id],
        notebook_from_row,
    )
    .optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        ai_summary: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn notebook_from_row(row: &Row<'_>) -> rusqlite::Result<NotebookRow> {
    Ok(NotebookRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        note_count: row.get(5)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        endpoint: row.get(2)?,
        p256dh_key: row.get(3)?,
        auth_key: row.get(4)?,
        user_agent: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
