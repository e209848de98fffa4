use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde_json::json;

const WINDOW_TTL_SECS: i64 = 120;

#[derive(Clone)]
pub struct RateLimitState {
    pub redis_client: redis::Client,
    pub max_per_minute: i64,
}

/// First hop of `x-forwarded-for`, then `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// One counter per provider route, client and minute, so a noisy webhook
/// sender cannot starve browser callbacks for another gateway.
pub fn window_key(path: &str, ip: &str, now: DateTime<Utc>) -> String {
    let route = path.trim_matches('/').replace('/', ":");
    format!("callback-rate:{route}:{ip}:{}", now.format("%Y%m%d%H%M"))
}

/// Fixed-window limiter for the public callback and webhook routes.
/// Redis being unreachable lets the request through.
pub async fn enforce(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers());
    let key = window_key(request.uri().path(), &ip, Utc::now());

    match state.redis_client.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            let count: i64 = conn.incr(&key, 1).await.unwrap_or(1);
            if count == 1 {
                let _: bool = conn.expire(&key, WINDOW_TTL_SECS).await.unwrap_or(false);
            }
            if count > state.max_per_minute {
                tracing::warn!(ip = %ip, key = %key, count, "inbound provider traffic throttled");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "success": false,
                        "code": "RATE_LIMITED",
                        "message": "Too many callback requests",
                    })),
                )
                    .into_response();
            }
        }
        Err(e) => tracing::debug!(error = %e, "rate limiter unavailable"),
    }

    next.run(request).await
}
