use std::path::Path as StdPath;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};
use uuid::Uuid;

pub mod gate;

use crate::config::AppConfig;
use crate::storage::{EnvS3Signer, ObjectUrlSigner, StorageError};

pub const DEFAULT_DOWNLOAD_NAME: &str = "download";

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RwLock<AppConfig>,
    signer: Arc<dyn ObjectUrlSigner>,
}

impl AppState {
    pub fn new(config: AppConfig, signer: Arc<dyn ObjectUrlSigner>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config: RwLock::new(config),
                signer,
            }),
        }
    }

    /// State backed by the environment-credential S3 signer.
    pub fn from_config(config: AppConfig) -> Self {
        let signer = Arc::new(EnvS3Signer::new(&config.storage));
        Self::new(config, signer)
    }

    pub async fn config(&self) -> AppConfig {
        self.inner.config.read().await.clone()
    }

    async fn presign(
        &self,
        object: &ObjectPath<'_>,
        content_disposition: Option<&str>,
    ) -> Result<String, StorageError> {
        let expires = self.inner.config.read().await.storage.signed_url_expiry();
        self.inner
            .signer
            .presign_get(object.bucket, object.key, expires, content_disposition)
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    pub p: Option<String>,
    pub filename: Option<String>,
}

/// `<bucket>/<key...>` split at the first slash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPath<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
}

impl<'a> ObjectPath<'a> {
    pub fn parse(p: Option<&'a str>) -> Result<Self, GatewayError> {
        let p = p.filter(|p| !p.is_empty()).ok_or(GatewayError::MissingPath)?;
        match p.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self { bucket, key }),
            _ => Err(GatewayError::InvalidPath),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    app_router_with_static(state, None)
}

/// API routes plus, when `static_dir` is set, the built admin frontend with
/// SPA fallback. Every route passes through the admin session gate.
pub fn app_router_with_static(state: AppState, static_dir: Option<&StdPath>) -> Router {
    let api = Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/media/proxy", get(media_proxy))
        .route("/api/media/download", get(media_download))
        .route("/api/{*path}", any(api_route_not_found))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let router = if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        let spa = ServeDir::new(dir).fallback(ServeFile::new(index));
        api.fallback_service(spa)
    } else {
        api
    };

    router.layer(middleware::from_fn(gate::gate_admin_routes))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn api_route_not_found(Path(path): Path<String>) -> AppError {
    AppError::NotFound(format!("api endpoint not found: /api/{path}"))
}

async fn get_config(State(state): State<AppState>) -> Json<AppConfig> {
    Json(state.config().await)
}

/// Redirect to a short-lived signed URL for the object.
async fn media_proxy(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, GatewayError> {
    let request_id = Uuid::new_v4();
    let object = ObjectPath::parse(query.p.as_deref())?;

    let url = state.presign(&object, None).await.map_err(|err| {
        error!(%request_id, bucket = object.bucket, key = object.key, error = %err, "Media proxy signing failed");
        GatewayError::Storage(err)
    })?;

    info!(%request_id, bucket = object.bucket, key = object.key, "Media proxy redirect");
    Ok(redirect_found(url))
}

/// Same as the proxy, but the signed URL forces an attachment download.
async fn media_download(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, GatewayError> {
    let request_id = Uuid::new_v4();
    let object = ObjectPath::parse(query.p.as_deref())?;
    let filename = sanitize_download_name(query.filename.as_deref());
    let disposition = format!("attachment; filename=\"{filename}\"");

    let url = state
        .presign(&object, Some(&disposition))
        .await
        .map_err(|err| {
            error!(%request_id, bucket = object.bucket, key = object.key, error = %err, "Media download signing failed");
            GatewayError::Storage(err)
        })?;

    info!(%request_id, bucket = object.bucket, key = object.key, %filename, "Media download redirect");
    Ok(redirect_found(url))
}

fn redirect_found(url: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, url)]).into_response()
}

/// Drop quotes, backslashes and control characters so the name cannot break
/// out of the `Content-Disposition` parameter. Empty results fall back to
/// [`DEFAULT_DOWNLOAD_NAME`].
pub fn sanitize_download_name(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_DOWNLOAD_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Media gateway failures, answered as plain text.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Missing p")]
    MissingPath,
    #[error("Invalid p")]
    InvalidPath,
    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::MissingPath | GatewayError::InvalidPath => StatusCode::BAD_REQUEST,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
