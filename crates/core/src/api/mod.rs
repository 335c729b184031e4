//! REST client for the job, catalog, media and account service.
//!
//! One [`ApiClient`] wraps a shared `reqwest::Client`; endpoint groups live in
//! the submodules as further `impl ApiClient` blocks.

pub mod admin;
pub mod auth;
pub mod features;
pub mod jobs;
pub mod media;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::credentials::CredentialProvider;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("not authenticated or session expired")]
    Unauthorized,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("response did not include a job id")]
    MissingJobId,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided message when there is one, otherwise the error text.
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Authenticated client for the backend REST API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        let mut base_url =
            Url::parse(base_url.trim()).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        // Keep any path prefix when joining endpoint paths.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            client,
            credentials,
        })
    }

    pub fn from_config(
        config: &ApiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        Self::new(&config.base_url, config.timeout(), credentials)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.url(path)?;
        let builder = self.client.request(method, url);
        Ok(match self.credentials.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Send and map non-success statuses. Any 401 clears the credential
    /// provider before surfacing [`ApiError::Unauthorized`].
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("API answered 401; clearing stored credentials");
            self.credentials.clear();
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        debug!(status = status.as_u16(), %message, "API request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)?).await
    }

    pub(crate) async fn get_json_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send_json(self.request(Method::GET, path)?.query(query))
            .await
    }

    pub(crate) async fn send_body<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(self.request(method, path)?.json(body)).await
    }

    /// Send and discard the body; used by DELETE and fire-and-forget POSTs.
    pub(crate) async fn send_empty(&self, method: Method, path: &str) -> Result<(), ApiError> {
        self.send(self.request(method, path)?).await?;
        Ok(())
    }
}

/// Pull a human-readable message out of an error body: JSON `message`
/// (string or list of strings), then JSON `error`, then the raw text.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        match value.get("message") {
            Some(Value::String(message)) if !message.trim().is_empty() => {
                return Some(message.trim().to_string());
            }
            Some(Value::Array(parts)) => {
                let joined = parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Some(error.to_string());
        }
        if value.is_object() {
            return None;
        }
    }

    Some(trimmed.to_string())
}
