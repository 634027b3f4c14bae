use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;

/// Tokens are issued by the platform's identity service; `sub` is the profile id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn decode_token(token: &str, secret: &str) -> Option<AuthUser> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let data = match decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256)) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!("Token rejected: {:?}", e);
            return None;
        }
    };
    let user_id = Uuid::parse_str(&data.claims.sub).ok()?;
    Some(AuthUser {
        user_id,
        email: data.claims.email.filter(|e| !e.trim().is_empty()),
    })
}

/// Signs a token the way the identity service does. Used by tests and local tooling.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: Option<&str>,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Unauthorized"})),
    )
        .into_response()
}

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let user = bearer_token(req.headers()).and_then(|t| decode_token(t, &state.config.jwt_secret));
    match user {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode() {
        let id = Uuid::new_v4();
        let token = issue_token("secret", id, Some("a@b.co"), chrono::Duration::hours(1)).unwrap();
        let user = decode_token(&token, "secret").unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.email.as_deref(), Some("a@b.co"));
        assert!(decode_token(&token, "other-secret").is_none());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = issue_token("secret", Uuid::new_v4(), None, chrono::Duration::hours(-2)).unwrap();
        assert!(decode_token(&token, "secret").is_none());
    }

    #[test]
    fn bearer_prefix_required() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Token abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
