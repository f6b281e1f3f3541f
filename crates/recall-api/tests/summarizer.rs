use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use recall_api::summarizer::Summarizer;

#[derive(Clone, Default)]
struct Upstream {
    calls: Arc<AtomicUsize>,
    /// Calls that fail before the fake starts answering.
    failures: usize,
}

async fn generate(
    State(upstream): State<Upstream>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let call = upstream.calls.fetch_add(1, Ordering::SeqCst);
    if call < upstream.failures {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if headers.get("x-goog-api-key").map(|v| v != "test-key").unwrap_or(true) {
        return Err(StatusCode::FORBIDDEN);
    }

    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
    Ok(Json(json!({
        "candidates": [{
            "content": { "parts": [{ "text": format!("{} summary of {} chars", model, prompt.len()) }] }
        }]
    })))
}

async fn upstream(failures: usize) -> (String, Upstream) {
    let state = Upstream {
        failures,
        ..Upstream::default()
    };
    let app = Router::new()
        .route("/models/{model}", post(generate))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/models", addr), state)
}

fn summarizer(base: String) -> Summarizer {
    Summarizer::new("test-key".to_string())
        .unwrap()
        .with_base_url(base)
        .with_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn first_model_answers() {
    let (base, state) = upstream(0).await;
    let summary = summarizer(base).summarize("Pattern matching is exhaustive").await.unwrap();

    assert!(summary.starts_with("gemini-2.5-flash:generateContent summary"), "{summary}");
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_then_falls_through_to_next_model() {
    // Three failures exhaust the first model.
    let (base, state) = upstream(3).await;
    let summary = summarizer(base).summarize("Slices borrow part of a collection").await.unwrap();

    assert!(summary.starts_with("gemini-2.5-pro"), "{summary}");
    assert_eq!(state.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn gives_up_after_every_model_fails() {
    let (base, state) = upstream(usize::MAX).await;
    assert!(summarizer(base).summarize("anything").await.is_none());
    assert_eq!(state.calls.load(Ordering::SeqCst), 9);
}

#[tokio::test]
async fn blank_content_is_not_sent() {
    let (base, state) = upstream(0).await;
    assert!(summarizer(base).summarize("   ").await.is_none());
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);
}
