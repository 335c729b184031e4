//! Session gate for the admin pages of the bundled frontend.

use axum::extract::Request;
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::api::auth::{login_url_with_redirect, ADMIN_PREFIX};
use crate::credentials::token_from_cookie_header;

/// Paths that never need a session, even under a gated prefix.
pub const EXEMPT_PREFIXES: [&str; 5] = ["/api/", "/_next/", "/favicon.ico", "/images/", "/public/"];

pub fn requires_session(path: &str) -> bool {
    !EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) && path.starts_with(ADMIN_PREFIX)
}

/// Shape check only: three dot-separated segments, a JSON payload, and an
/// `exp` (seconds, number or numeric string) that is not in the past. A zero
/// or non-numeric `exp` counts as absent. The signature is not verified.
pub fn token_looks_valid(token: &str, now_secs: i64) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return false;
    }
    let Some(payload) = decode_segment(segments[1]) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&payload) else {
        return false;
    };
    expiry(&claims).map_or(true, |exp| exp >= now_secs as f64)
}

fn expiry(claims: &Value) -> Option<f64> {
    match claims.get("exp")? {
        Value::Number(exp) => exp.as_f64().filter(|exp| *exp != 0.0),
        Value::String(exp) if !exp.is_empty() => exp.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(segment))
        .ok()
}

/// Redirect gated pages to `/login?redirect=<path>` unless the request
/// carries a plausible session cookie.
pub async fn gate_admin_routes(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !requires_session(&path) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(token_from_cookie_header);

    match token {
        Some(token) if token_looks_valid(&token, Utc::now().timestamp()) => next.run(request).await,
        _ => {
            debug!(%path, "Missing or invalid session token; redirecting to login");
            Redirect::temporary(&login_url_with_redirect(&path)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_claims(claims: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn exempt_and_public_paths_skip_the_gate() {
        assert!(requires_session("/admin"));
        assert!(requires_session("/admin/explore"));
        assert!(!requires_session("/api/media/proxy"));
        assert!(!requires_session("/_next/static/chunk.js"));
        assert!(!requires_session("/login"));
        assert!(!requires_session("/"));
    }

    #[test]
    fn token_expiry_is_enforced() {
        let now = 1_700_000_000;
        assert!(token_looks_valid(&token_with_claims(r#"{"sub":"u1","exp":1700000100}"#), now));
        assert!(!token_looks_valid(&token_with_claims(r#"{"sub":"u1","exp":1699999999}"#), now));
        assert!(token_looks_valid(&token_with_claims(r#"{"sub":"u1"}"#), now));
    }

    #[test]
    fn string_expiry_is_compared_numerically() {
        let now = 1_700_000_000;
        assert!(!token_looks_valid(&token_with_claims(r#"{"exp":"123"}"#), now));
        assert!(!token_looks_valid(&token_with_claims(r#"{"exp":-5}"#), now));
        assert!(token_looks_valid(&token_with_claims(r#"{"exp":"4102444800"}"#), now));
        assert!(token_looks_valid(&token_with_claims(r#"{"exp":"never"}"#), now));
        assert!(token_looks_valid(&token_with_claims(r#"{"exp":0}"#), now));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let now = 1_700_000_000;
        assert!(!token_looks_valid("opaque-session-id", now));
        assert!(!token_looks_valid("a.b", now));
        assert!(!token_looks_valid("a.%%%.c", now));
        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("plain text"));
        assert!(!token_looks_valid(&not_json, now));
    }

    #[test]
    fn padded_standard_base64_payload_is_accepted() {
        let payload = STANDARD.encode(r#"{"exp":4102444800}"#);
        assert!(token_looks_valid(&format!("h.{payload}.s"), 1_700_000_000));
    }
}
