mod cors;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use recall_api::auth::{AppState, AppStateInner};
use recall_api::summarizer::Summarizer;
use recall_db::Database;
use recall_notify::{DailyNotifier, PushConfig, WebPushTransport};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key-here",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    if std::env::args().nth(1).as_deref() == Some("generate-vapid-keys") {
        let (private_key, public_key) = recall_push::vapid::generate_keys();
        println!("RECALL_VAPID_PUBLIC_KEY={}", public_key);
        println!("RECALL_VAPID_PRIVATE_KEY={}", private_key);
        return Ok(());
    }

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recall_server=debug,recall_api=debug,recall_notify=info,recall_db=info,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("RECALL_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: RECALL_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("RECALL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RECALL_PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("RECALL_DB_PATH")
        .unwrap_or_else(|_| "recall.db".into())
        .into();
    let token_ttl_days: i64 = std::env::var("RECALL_TOKEN_TTL_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(180);
    let origins = cors::parse_origins(&std::env::var("RECALL_FRONTEND_ORIGINS").unwrap_or_default());
    let trigger_token = std::env::var("RECALL_TRIGGER_TOKEN")
        .ok()
        .filter(|v| !v.trim().is_empty());

    // Init database
    let db = Arc::new(Database::open(&db_path)?);

    // Missing or broken VAPID keys disable push; the rest of the API still serves.
    let notifier = match PushConfig::from_env() {
        Ok(config) => match WebPushTransport::new(&config) {
            Ok(transport) => {
                info!("Push delivery enabled (subject {})", config.vapid_subject);
                Some(Arc::new(DailyNotifier::new(db.clone(), transport)))
            }
            Err(e) => {
                error!("Invalid VAPID configuration, push delivery disabled: {:#}", e);
                None
            }
        },
        Err(e) => {
            error!("Push delivery disabled: {}", e);
            None
        }
    };

    let summarizer = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Some(Summarizer::new(key)?),
        _ => {
            warn!("GEMINI_API_KEY not set, notes will not be summarized");
            None
        }
    };

    if trigger_token.is_none() {
        warn!("RECALL_TRIGGER_TOKEN not set, the notification trigger is open");
    }

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        token_ttl: chrono::Duration::days(token_ttl_days.max(1)),
        summarizer,
        notifier,
        trigger_token,
    });

    let app = recall_api::router(state)
        .layer(cors::layer(origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Recall server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
