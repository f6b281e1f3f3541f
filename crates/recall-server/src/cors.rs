use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}, request::Parts};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Local frontends, always allowed.
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

/// Comma-separated origins, trailing slashes dropped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn origin_allowed(configured: &[String], origin: &str) -> bool {
    configured.iter().any(|o| o == origin)
        || DEV_ORIGINS.contains(&origin)
        || is_preview_deployment(origin)
}

fn is_preview_deployment(origin: &str) -> bool {
    origin
        .strip_prefix("https://")
        .and_then(|host| host.strip_suffix(".vercel.app"))
        .is_some_and(|name| !name.is_empty() && !name.contains(['/', '.', ':']))
}

pub fn layer(configured: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .map(|o| origin_allowed(&configured, o))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}
