//! Job submission payloads and the failure taxonomy surfaced to callers.

use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::warn;

use crate::api::ApiError;

pub const DEFAULT_FACE_SWAPPER_MODEL: &str = "inswapper_128";

/// Used when the catalog has no `face_swapper_model` options.
pub const FALLBACK_FACE_SWAPPER_MODELS: [&str; 2] = ["inswapper_128", "hyperswap_1a_256"];

/// One file attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// MIME type is guessed from the file name.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            mime,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read upload file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }

    fn to_part(&self) -> Result<Part, ApiError> {
        Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime)
            .map_err(|e| ApiError::Decode(format!("invalid MIME type '{}': {e}", self.mime)))
    }
}

/// Typed processing options with a passthrough bucket for anything the
/// worker accepts that is not modelled here.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub face_swapper_model: String,
    pub use_cuda: bool,
    pub device_id: u32,
    pub extra: Map<String, Value>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            face_swapper_model: DEFAULT_FACE_SWAPPER_MODEL.to_string(),
            use_cuda: true,
            device_id: 0,
            extra: Map::new(),
        }
    }
}

impl JobOptions {
    /// Merge user-supplied JSON into `extra`. Input that is not a JSON object
    /// is ignored; returns whether anything was merged.
    pub fn merge_raw_extra(&mut self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => {
                self.extra.extend(map);
                true
            }
            Ok(_) => {
                warn!("ignoring extra options: expected a JSON object");
                false
            }
            Err(error) => {
                warn!(%error, "ignoring extra options: invalid JSON");
                false
            }
        }
    }

    /// Wire form. `deviceId` is a string and `extra` keys win over typed ones.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "faceSwapperModel".to_string(),
            Value::String(self.face_swapper_model.clone()),
        );
        object.insert("useCuda".to_string(), Value::Bool(self.use_cuda));
        object.insert("deviceId".to_string(), Value::String(self.device_id.to_string()));
        for (key, value) in &self.extra {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub source: UploadFile,
    pub target: UploadFile,
    pub audio: Option<UploadFile>,
    pub processors: Vec<String>,
    pub options: JobOptions,
}

impl JobSubmission {
    /// Multipart body for `POST /jobs/uploaded-process`.
    pub fn to_form(&self) -> Result<Form, ApiError> {
        let processors = serde_json::to_string(&self.processors)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let mut form = Form::new()
            .part("source", self.source.to_part()?)
            .part("target", self.target.to_part()?);
        if let Some(audio) = &self.audio {
            form = form.part("audio", audio.to_part()?);
        }
        Ok(form
            .text("processors", processors)
            .text("options", self.options.to_value().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("select a source, a target and at least one processor that fits today's quota")]
    NotReady,
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("daily quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("file too large: {0}")]
    PayloadTooLarge(String),
    #[error("unprocessable input: {0}")]
    Unprocessable(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("submission failed: {0}")]
    Unknown(String),
}

impl SubmitError {
    /// Map an API failure onto the submission taxonomy. A 403 counts as a
    /// quota rejection when its message mentions `quota` or `limit`.
    pub fn classify(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => Self::SessionExpired,
            ApiError::Network(message) => Self::Network(message),
            ApiError::Status { status, message } => match status {
                400 => Self::Validation(message),
                401 => Self::SessionExpired,
                403 if is_quota_message(&message) => Self::QuotaExceeded(message),
                403 => Self::PermissionDenied(message),
                413 => Self::PayloadTooLarge(message),
                422 => Self::Unprocessable(message),
                other => Self::Unknown(format!("HTTP {other}: {message}")),
            },
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The caller has to re-authenticate before anything else succeeds.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<ApiError> for SubmitError {
    fn from(error: ApiError) -> Self {
        Self::classify(error)
    }
}

pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("limit")
}
