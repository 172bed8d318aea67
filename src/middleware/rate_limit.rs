use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::RwLock;

/// Sliding-window limiter keyed by caller IP, held in memory. Report
/// generation fans out to the LLM, so it is the one route worth capping.
#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    max_hits: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_hits: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(RwLock::new(HashMap::new())),
            max_hits,
            window,
        }
    }

    pub fn from_env() -> Self {
        let max_hits = std::env::var("REPORT_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);
        Self::new(max_hits, Duration::from_secs(60))
    }

    /// Records a hit for the caller and says whether it stays under the cap.
    pub async fn allow(&self, caller: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let window = hits.entry(caller.to_string()).or_default();

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_hits {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    /// Forgets callers whose newest hit already fell out of the window, so
    /// the map does not keep every IP ever seen.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        hits.retain(|_, window| {
            window
                .back()
                .map(|newest| now.duration_since(*newest) < self.window)
                .unwrap_or(false)
        });
        tracing::debug!("Rate limiter sweep done, {} callers tracked", hits.len());
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let caller = addr.ip().to_string();
    if !limiter.allow(&caller).await {
        tracing::warn!("Rate limit exceeded for {caller}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "success": false,
                "message": "too many requests, try again later",
            })),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_caps_each_caller_separately() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.allow("10.0.0.1").await);
        assert!(limiter.allow("10.0.0.1").await);
        assert!(!limiter.allow("10.0.0.1").await);

        assert!(limiter.allow("10.0.0.2").await);
    }

    #[tokio::test]
    async fn test_window_expiry_frees_the_caller() {
        let limiter = RateLimiter::new(1, Duration::from_millis(40));

        assert!(limiter.allow("10.0.0.1").await);
        assert!(!limiter.allow("10.0.0.1").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.allow("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_sweep_forgets_idle_callers() {
        let limiter = RateLimiter::new(5, Duration::from_millis(40));
        limiter.allow("10.0.0.1").await;
        limiter.allow("10.0.0.2").await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        limiter.sweep().await;

        assert_eq!(limiter.hits.read().await.len(), 0);
    }
}
