use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::auth::AppState;
use crate::db_call;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Tried in order until one produces a summary.
const MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.0-flash"];
const ATTEMPTS_PER_MODEL: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini client producing the short summaries used as notification bodies.
#[derive(Clone)]
pub struct Summarizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    backoff_base: Duration,
}

impl Summarizer {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: API_BASE.to_string(),
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Point at another `generateContent`-compatible host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Delay before the first retry; doubles with every further attempt.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// None if the content is blank or every model and attempt failed.
    pub async fn summarize(&self, content: &str) -> Option<String> {
        if content.trim().is_empty() {
            return None;
        }

        let prompt = prompt(content);

        for (model_idx, model) in MODELS.iter().enumerate() {
            for attempt in 0..ATTEMPTS_PER_MODEL {
                match self.generate(model, &prompt).await {
                    Ok(summary) => {
                        debug!("Summary generated with {} on attempt {}", model, attempt + 1);
                        return Some(summary);
                    }
                    Err(e) => {
                        warn!("Summarization with {} failed (attempt {}): {:#}", model, attempt + 1, e);
                    }
                }

                let last = model_idx + 1 == MODELS.len() && attempt + 1 == ATTEMPTS_PER_MODEL;
                if !last {
                    tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
                }
            }
        }

        error!("All summarization models failed");
        None
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} responded {}", model, status);
        }

        let value: Value = response.json().await?;
        extract_text(&value).ok_or_else(|| anyhow!("{} returned no text", model))
    }
}

fn prompt(content: &str) -> String {
    format!(
        "Summarize the following note in at most 40 words. \
         Reply with the summary only, no preamble.\n\n{}",
        content
    )
}

/// First candidate's text, trimmed. None when absent or blank.
pub fn extract_text(response: &Value) -> Option<String> {
    let text = response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()?
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Summarize in the background and store the result. Failures only log;
/// the note keeps a NULL summary.
pub fn spawn_summary(state: &AppState, note_id: String, content: String) {
    let Some(summarizer) = state.summarizer.clone() else {
        return;
    };
    let state = state.clone();

    tokio::spawn(async move {
        let Some(summary) = summarizer.summarize(&content).await else {
            return;
        };

        let id = note_id.clone();
        match db_call(&state, move |db| db.set_note_summary(&id, &summary)).await {
            Ok(true) => info!("Stored summary for note {}", note_id),
            Ok(false) => debug!("Note {} was deleted before its summary was ready", note_id),
            Err(_) => warn!("Failed to store summary for note {}", note_id),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let response = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "  Ownership moves values.\n" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("Ownership moves values."));
    }

    #[test]
    fn missing_or_blank_text_is_none() {
        assert!(extract_text(&json!({})).is_none());
        assert!(extract_text(&json!({ "candidates": [] })).is_none());
        assert!(extract_text(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
        }))
        .is_none());
    }

    #[test]
    fn prompt_carries_content_and_limit() {
        let p = prompt("traits are interfaces");
        assert!(p.contains("40 words"));
        assert!(p.ends_with("traits are interfaces"));
    }
}
