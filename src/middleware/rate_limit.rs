use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use super::auth::{bearer_token, decode_token};

const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Anonymous,
    /// Requests carrying a valid bearer token get five times the budget.
    Authenticated,
}

/// Fixed-window limiter keyed by client IP, one table per tier.
#[derive(Clone)]
pub struct RateLimiter {
    anonymous: Arc<RwLock<HashMap<String, Window>>>,
    authenticated: Arc<RwLock<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
    jwt_secret: Option<Arc<str>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            anonymous: Arc::new(RwLock::new(HashMap::new())),
            authenticated: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
            jwt_secret: None,
        }
    }

    /// Tokens signed with `secret` earn the authenticated tier. Without it every caller is anonymous.
    pub fn with_token_secret(mut self, secret: &str) -> Self {
        self.jwt_secret = Some(Arc::from(secret));
        self
    }

    pub fn tier(&self, headers: &HeaderMap) -> Tier {
        let valid = match (&self.jwt_secret, bearer_token(headers)) {
            (Some(secret), Some(token)) => decode_token(token, secret).is_some(),
            _ => false,
        };
        if valid {
            Tier::Authenticated
        } else {
            Tier::Anonymous
        }
    }

    /// 0 turns limiting off.
    pub fn is_disabled(&self) -> bool {
        self.max_requests == 0
    }

    fn budget(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Anonymous => self.max_requests,
            Tier::Authenticated => self.max_requests.saturating_mul(5),
        }
    }

    pub async fn check(&self, tier: Tier, key: &str) -> Result<(), StatusCode> {
        let budget = self.budget(tier);
        let table = match tier {
            Tier::Anonymous => &self.anonymous,
            Tier::Authenticated => &self.authenticated,
        };
        let mut windows = table.write().await;
        let now = Instant::now();

        if windows.len() > MAX_TRACKED_KEYS {
            windows.retain(|_, w| w.reset_at > now);
        }

        let fresh = Window {
            count: 0,
            reset_at: now + self.window,
        };
        let window = windows.entry(key.to_string()).or_insert(fresh);
        if window.reset_at <= now {
            *window = fresh;
        }
        if window.count >= budget {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
        window.count += 1;
        Ok(())
    }
}

fn client_ip(req: &Request) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    // Provider callbacks are signed and must never be dropped.
    if rate_limiter.is_disabled() || path == "/health" || path == "/ws" || path.starts_with("/api/webhooks/") {
        return next.run(req).await;
    }

    let tier = rate_limiter.tier(req.headers());
    let ip = client_ip(&req);

    if let Err(status) = rate_limiter.check(tier, &ip).await {
        tracing::warn!(%ip, ?tier, "Rate limit exceeded");
        return (status, Json(serde_json::json!({"error": "Too many requests"}))).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_budget() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check(Tier::Anonymous, "1.2.3.4").await.is_ok());
        assert!(limiter.check(Tier::Anonymous, "1.2.3.4").await.is_ok());
        assert_eq!(
            limiter.check(Tier::Anonymous, "1.2.3.4").await,
            Err(StatusCode::TOO_MANY_REQUESTS)
        );
        assert!(limiter.check(Tier::Anonymous, "5.6.7.8").await.is_ok());
    }

    #[tokio::test]
    async fn authenticated_tier_gets_five_times() {
        let limiter = RateLimiter::new(1, 60);
        for _ in 0..5 {
            assert!(limiter.check(Tier::Authenticated, "1.2.3.4").await.is_ok());
        }
        assert!(limiter.check(Tier::Authenticated, "1.2.3.4").await.is_err());
    }

    #[test]
    fn only_valid_tokens_earn_authenticated_tier() {
        use axum::http::header::AUTHORIZATION;

        let limiter = RateLimiter::new(1, 60).with_token_secret("secret");
        let token = crate::middleware::auth::issue_token("secret", uuid::Uuid::new_v4(), None, chrono::Duration::hours(1))
            .unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(limiter.tier(&headers), Tier::Anonymous);

        headers.insert(AUTHORIZATION, "Bearer forged".parse().unwrap());
        assert_eq!(limiter.tier(&headers), Tier::Anonymous);

        headers.insert(AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
        assert_eq!(limiter.tier(&headers), Tier::Authenticated);

        let no_secret = RateLimiter::new(1, 60);
        assert_eq!(no_secret.tier(&headers), Tier::Anonymous);
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut req = Request::new(axum::body::Body::empty());
        assert_eq!(client_ip(&req), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        assert_eq!(client_ip(&req), "10.0.0.7");

        req.headers_mut().insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&req), "203.0.113.9");
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = RateLimiter::new(1, 0);
        tokio_test::assert_ok!(limiter.check(Tier::Anonymous, "ip").await);
        tokio_test::assert_ok!(limiter.check(Tier::Anonymous, "ip").await);
    }
}
