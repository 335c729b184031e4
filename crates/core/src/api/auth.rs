use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use url::form_urlencoded;

use super::admin::User;
use super::{ApiClient, ApiError};

pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_PREFIX: &str = "/admin";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<User>,
}

impl ApiClient {
    /// `POST /auth/login`. Returns the issued token when the response
    /// carries one (`token`, `access_token`, `accessToken` or `id_token`).
    pub async fn login(&self, request: &LoginRequest) -> Result<Option<String>, ApiError> {
        let body: Value = self.send_body(Method::POST, "/auth/login", request).await?;
        Ok(token_from_response(&body))
    }

    /// `POST /auth/exchange-code` for the single-sign-on callback.
    pub async fn exchange_code(&self, code: &str) -> Result<Option<String>, ApiError> {
        let body: Value = self
            .send_body(Method::POST, "/auth/exchange-code", &json!({ "code": code }))
            .await?;
        Ok(token_from_response(&body))
    }

    /// `GET /auth/me`. Any failure reads as signed out.
    pub async fn auth_status(&self) -> AuthStatus {
        match self.get_json::<AuthStatus>("/auth/me").await {
            Ok(status) => status,
            Err(error) => {
                warn!(%error, "Auth check failed");
                AuthStatus {
                    authenticated: false,
                    user: None,
                }
            }
        }
    }

    /// `POST /auth/logout`. Local credentials are dropped even if the call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.send_empty(Method::POST, "/auth/logout").await;
        self.credentials().clear();
        result
    }

    /// Absolute `GET /auth/prime/login` URL that starts single sign-on and
    /// returns to `redirect_uri`.
    pub fn prime_login_url(&self, redirect_uri: &str) -> Result<String, ApiError> {
        let mut url = self.url("/auth/prime/login")?;
        url.query_pairs_mut().append_pair("redirect_uri", redirect_uri);
        Ok(url.to_string())
    }
}

fn token_from_response(body: &Value) -> Option<String> {
    ["token", "access_token", "accessToken", "id_token"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
}

/// Where to send the user after a 401 observed while on `current_path`.
/// Only admin pages that are not the login page redirect.
pub fn login_redirect_for(current_path: &str) -> Option<&'static str> {
    (current_path.starts_with(ADMIN_PREFIX) && !current_path.contains(LOGIN_PATH)).then_some(LOGIN_PATH)
}

/// `/login?redirect=<path>` with the path form-encoded.
pub fn login_url_with_redirect(path: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", path)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}
