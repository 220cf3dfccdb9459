use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use log::warn;
use sha2::Sha256;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::shared::state::AppState;
use crate::core::urls::is_csrf_exempt;
use crate::security::session::hash_token;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-csrf-token";
const TOKEN_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfValidationResult {
    Valid,
    Missing,
    Malformed,
    Expired,
    Invalid,
}

impl CsrfValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "Token is valid",
            Self::Missing => "CSRF token is missing",
            Self::Malformed => "CSRF token is malformed",
            Self::Expired => "CSRF token has expired",
            Self::Invalid => "CSRF token is invalid",
        }
    }
}

/// Stateless tokens: `{expiry}.{hmac(secret, binding.expiry)}` where the
/// binding is the hash of the caller's session token.
#[derive(Clone)]
pub struct CsrfManager {
    secret: Arc<Vec<u8>>,
}

impl CsrfManager {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }

    pub fn issue(&self, binding: &str) -> String {
        let expires = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp();
        let signature = self.sign(&format!("{binding}.{expires}"));
        format!("{expires}.{signature}")
    }

    pub fn verify(&self, token: &str, binding: &str) -> CsrfValidationResult {
        let Some((expires, signature)) = token.split_once('.') else {
            return CsrfValidationResult::Malformed;
        };
        let Ok(expires_ts) = expires.parse::<i64>() else {
            return CsrfValidationResult::Malformed;
        };

        let expected = self.sign(&format!("{binding}.{expires}"));
        if !constant_time_compare(&expected, signature) {
            return CsrfValidationResult::Invalid;
        }
        if Utc::now().timestamp() > expires_ts {
            return CsrfValidationResult::Expired;
        }
        CsrfValidationResult::Valid
    }

    /// HMAC-SHA256 of `data`, base64url encoded.
    pub fn sign(&self, data: &str) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return String::new();
        };
        mac.update(data.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    pub fn verify_signature(&self, data: &str, signature: &str) -> bool {
        constant_time_compare(&self.sign(data), signature)
    }
}

impl std::fmt::Debug for CsrfManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfManager")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

fn is_exempt_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Cookie-authenticated mutations must echo a token from `/api/auth/me`.
/// Bearer callers and anonymous requests pass through; the auth extractor
/// rejects the latter.
pub async fn require_csrf(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if is_exempt_method(&method) || is_csrf_exempt(&path) {
        return next.run(request).await;
    }

    let Some(session_cookie) = cookies.get(&state.config.session.cookie_name) else {
        return next.run(request).await;
    };

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());

    let result = match header_token {
        Some(token) => state.csrf.verify(token, &hash_token(session_cookie.value())),
        None => CsrfValidationResult::Missing,
    };

    if !result.is_valid() {
        warn!(
            "CSRF validation failed for {} {}: {}",
            method,
            path,
            result.error_message()
        );
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": result.error_message() })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> CsrfManager {
        CsrfManager::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[test]
    fn test_issue_and_verify() {
        let m = manager();
        let token = m.issue("session-a");
        assert_eq!(m.verify(&token, "session-a"), CsrfValidationResult::Valid);
    }

    #[test]
    fn test_token_bound_to_session() {
        let m = manager();
        let token = m.issue("session-a");
        assert_eq!(m.verify(&token, "session-b"), CsrfValidationResult::Invalid);
    }

    #[test]
    fn test_expired_token() {
        let m = manager();
        let expires = (Utc::now() - Duration::minutes(1)).timestamp();
        let token = format!("{expires}.{}", m.sign(&format!("s.{expires}")));
        assert_eq!(m.verify(&token, "s"), CsrfValidationResult::Expired);
    }

    #[test]
    fn test_malformed_tokens() {
        let m = manager();
        assert_eq!(m.verify("garbage", "s"), CsrfValidationResult::Malformed);
        assert_eq!(m.verify("abc.def", "s"), CsrfValidationResult::Malformed);
    }

    #[test]
    fn test_different_secret_rejects() {
        let token = manager().issue("s");
        let other = CsrfManager::new(b"another-secret-another-secret-123".to_vec());
        assert!(!other.verify(&token, "s").is_valid());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }

    #[test]
    fn test_exempt_methods() {
        assert!(is_exempt_method(&Method::GET));
        assert!(!is_exempt_method(&Method::POST));
        assert!(!is_exempt_method(&Method::DELETE));
    }
}
