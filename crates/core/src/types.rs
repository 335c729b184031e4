//! Wire types shared by the job workflow, the catalog and the media library.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PROCESSOR_TYPE: &str = "processor";
pub const FEATURE_TYPE: &str = "feature";
pub const PROCESSOR_OPTION_TYPE: &str = "processor_option";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_INACTIVE: &str = "INACTIVE";

/// A selectable processing capability or one of its configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Feature {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn is_processor(&self) -> bool {
        self.kind == PROCESSOR_TYPE
    }

    pub fn is_active_processor(&self) -> bool {
        self.is_processor() && self.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesPage {
    #[serde(default)]
    pub items: Vec<Feature>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub take: Option<u64>,
}

/// Today's weight budget for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaToday {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub used: u64,
    pub remaining: u64,
    pub daily_limit: u64,
}

impl QuotaToday {
    /// Build from `used` and `daily_limit`, deriving `remaining`.
    pub fn from_usage(used: u64, daily_limit: u64) -> Self {
        Self {
            date: None,
            used,
            remaining: daily_limit.saturating_sub(used),
            daily_limit,
        }
    }

    /// Normalize the loosely shaped `/jobs/quota-today` payload. A numeric
    /// `remaining` from the server is trusted as-is.
    pub fn from_value(raw: &Value) -> Self {
        let number = |keys: &[&str]| keys.iter().find_map(|key| lookup_u64(raw, key));

        let used = number(&["used", "usedWeight", "todayUsed"]).unwrap_or(0);
        let daily_limit = number(&["dailyLimit", "limit", "planLimit"])
            .or_else(|| {
                raw.get("planEntitlements")
                    .and_then(|ent| lookup_u64(ent, "daily_weight_quota"))
            })
            .unwrap_or(0);
        let remaining = number(&["remaining", "remainingWeight", "left"])
            .unwrap_or_else(|| daily_limit.saturating_sub(used));
        let date = ["date", "forDate"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(Value::as_str))
            .map(ToOwned::to_owned);

        Self {
            date,
            used,
            remaining,
            daily_limit,
        }
    }
}

fn lookup_u64(raw: &Value, key: &str) -> Option<u64> {
    let value = raw.get(key)?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value.as_f64().map(|n| if n <= 0.0 { 0 } else { n as u64 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Forward-only lifecycle. `Failed -> Queued` is a requeue and is only
    /// legal when `requeue` is set.
    pub fn can_advance_to(self, next: JobStatus, requeue: bool) -> bool {
        if self == next {
            return true;
        }
        if requeue {
            return self == Self::Failed && next == Self::Queued;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asynchronous processing job as reported by the job service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl Job {
    pub fn new(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            processors: Vec::new(),
            created_at: None,
            started_at: None,
            finished_at: None,
            error: None,
            result_url: None,
            user_id: None,
            weight_used: None,
            progress_pct: None,
            options: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Video,
    Image,
    Audio,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaJob {
    pub id: String,
    #[serde(default)]
    pub processors: Vec<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// An object produced by a completed job, addressed by bucket + key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub bucket: String,
    pub object_key: String,
    #[serde(default)]
    pub path: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default, deserialize_with = "size_from_string_or_number")]
    pub size_bytes: u64,
    pub created_at: String,
    #[serde(default)]
    pub output_for_jobs: Vec<MediaJob>,
}

impl MediaAsset {
    /// `<bucket>/<objectKey>`, the composite the media gateway accepts.
    pub fn gateway_path(&self) -> String {
        format!("{}/{}", self.bucket, self.object_key)
    }

    /// Last key segment, or `download` when the key ends in a slash.
    pub fn file_name(&self) -> &str {
        self.object_key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub skip: u64,
    pub take: u64,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaListResponse {
    #[serde(default)]
    pub data: Vec<MediaAsset>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ids arrive as strings from some endpoints and as integers from others.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "invalid job id {other}: expected a string or a number"
        ))),
    }
}

fn size_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Ok(n.as_u64().unwrap_or(0)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid sizeBytes '{s}': {e}"))),
        _ => Ok(0),
    }
}
