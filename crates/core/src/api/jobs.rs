use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{ApiClient, ApiError};
use crate::submission::JobSubmission;
use crate::types::{Job, QuotaToday};

pub const DEFAULT_HISTORY_TAKE: u32 = 5;
pub const DEFAULT_ANALYTICS_DAYS: u32 = 30;

/// Query for `GET /jobs/admin/users/:id/jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct UserJobsQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Default for UserJobsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJobsResponse {
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DateRange {
    pub from: String,
    pub to: String,
    pub days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorUsage {
    pub name: String,
    pub count: u64,
    pub total_weight: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub success_rate: String,
    pub unique_users: u64,
    pub avg_weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorAnalyticsSummary {
    pub total_jobs: u64,
    pub date_range: DateRange,
    pub most_popular: Option<String>,
    pub total_processor_usage: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorAnalytics {
    pub processors: Vec<ProcessorUsage>,
    pub summary: ProcessorAnalyticsSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserJobStats {
    pub total_jobs: u64,
    pub total_weight: u64,
    pub succeeded_jobs: u64,
    pub failed_jobs: u64,
    pub queued_jobs: u64,
    pub running_jobs: u64,
    pub success_rate: String,
    pub avg_weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserUsage {
    pub user: Value,
    pub stats: UserJobStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAnalyticsSummary {
    pub total_users: u64,
    pub date_range: DateRange,
    pub total_jobs: u64,
    pub total_weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAnalytics {
    pub users: Vec<UserUsage>,
    pub summary: UserAnalyticsSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Overview {
    pub total_jobs_all_time: u64,
    pub recent_jobs: u64,
    pub unique_active_users: u64,
    pub success_rate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusDistribution {
    pub queued: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyActivity {
    pub date: String,
    pub count: u64,
    pub total_weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryAnalytics {
    pub overview: Overview,
    pub status_distribution: StatusDistribution,
    pub daily_activity: Vec<DailyActivity>,
    pub date_range: DateRange,
}

impl ApiClient {
    /// `GET /jobs/quota-today`, normalized.
    pub async fn quota_today(&self) -> Result<QuotaToday, ApiError> {
        let raw: Value = self.get_json("/jobs/quota-today").await?;
        Ok(QuotaToday::from_value(&raw))
    }

    /// `POST /jobs/uploaded-process` and return the new job id.
    pub async fn create_uploaded_process(&self, submission: &JobSubmission) -> Result<String, ApiError> {
        let form = submission.to_form()?;
        let request = self
            .request(Method::POST, "/jobs/uploaded-process")?
            .multipart(form);
        let body: Value = self.send_json(request).await?;
        let id = job_id_from_response(&body).ok_or(ApiError::MissingJobId)?;
        info!(job_id = %id, processors = ?submission.processors, "Job submitted");
        Ok(id)
    }

    /// `GET /jobs/:id`
    pub async fn get_job(&self, id: &str) -> Result<Job, ApiError> {
        self.get_json(&format!("/jobs/{id}")).await
    }

    /// `POST /jobs/:id/requeue`
    pub async fn requeue_job(&self, id: &str) -> Result<Job, ApiError> {
        self.send_body(Method::POST, &format!("/jobs/{id}/requeue"), &json!({}))
            .await
    }

    /// `GET /jobs?take=&skip=`. The list comes back either bare or as `{items}`.
    pub async fn list_jobs(&self, take: u32, skip: u32) -> Result<Vec<Job>, ApiError> {
        let body: Value = self
            .get_json_query("/jobs", &[("take", take), ("skip", skip)])
            .await?;
        jobs_from_response(body)
    }

    /// `GET /jobs/admin/users/:id/jobs`
    pub async fn user_jobs(&self, user_id: &str, query: &UserJobsQuery) -> Result<UserJobsResponse, ApiError> {
        self.get_json_query(&format!("/jobs/admin/users/{user_id}/jobs"), query)
            .await
    }

    /// `GET /jobs/admin/analytics/processors`
    pub async fn processor_analytics(
        &self,
        days: u32,
        user_id: Option<&str>,
    ) -> Result<ProcessorAnalytics, ApiError> {
        let mut query = vec![("days", days.to_string())];
        if let Some(user_id) = user_id {
            query.push(("userId", user_id.to_string()));
        }
        self.get_json_query("/jobs/admin/analytics/processors", &query)
            .await
    }

    /// `GET /jobs/admin/analytics/users`
    pub async fn user_analytics(&self, days: u32, limit: u32) -> Result<UserAnalytics, ApiError> {
        self.get_json_query("/jobs/admin/analytics/users", &[("days", days), ("limit", limit)])
            .await
    }

    /// `GET /jobs/admin/analytics/summary`
    pub async fn summary_analytics(&self, days: u32) -> Result<SummaryAnalytics, ApiError> {
        self.get_json_query("/jobs/admin/analytics/summary", &[("days", days)])
            .await
    }
}

/// Job id from `id`, `jobId` or `job.id`, accepting strings or numbers.
pub fn job_id_from_response(body: &Value) -> Option<String> {
    [
        body.get("id"),
        body.get("jobId"),
        body.get("job").and_then(|job| job.get("id")),
    ]
    .into_iter()
    .flatten()
    .find_map(|value| match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

fn jobs_from_response(body: Value) -> Result<Vec<Job>, ApiError> {
    let list = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut object) => object.remove("items").unwrap_or(Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    serde_json::from_value(list).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;

    #[test]
    fn job_id_is_read_from_any_known_field() {
        assert_eq!(job_id_from_response(&json!({ "id": "a1" })).as_deref(), Some("a1"));
        assert_eq!(job_id_from_response(&json!({ "jobId": 42 })).as_deref(), Some("42"));
        assert_eq!(
            job_id_from_response(&json!({ "job": { "id": "nested" } })).as_deref(),
            Some("nested")
        );
        assert_eq!(
            job_id_from_response(&json!({ "id": "", "jobId": "fallback" })).as_deref(),
            Some("fallback")
        );
        assert_eq!(job_id_from_response(&json!({ "status": "QUEUED" })), None);
    }

    #[test]
    fn job_list_accepts_array_or_items() {
        let bare = jobs_from_response(json!([{ "id": "1", "status": "QUEUED" }])).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped = jobs_from_response(json!({
            "items": [{ "id": "2", "status": "SUCCEEDED" }],
            "total": 1
        }))
        .unwrap();
        assert_eq!(wrapped[0].status, JobStatus::Succeeded);

        assert!(jobs_from_response(json!({ "total": 0 })).unwrap().is_empty());
    }

    #[test]
    fn summary_analytics_tolerates_missing_sections() {
        let summary: SummaryAnalytics = serde_json::from_value(json!({
            "overview": { "totalJobsAllTime": 12, "successRate": "75.0" },
            "statusDistribution": { "failed": 3 }
        }))
        .unwrap();
        assert_eq!(summary.overview.total_jobs_all_time, 12);
        assert_eq!(summary.status_distribution.failed, 3);
        assert!(summary.daily_activity.is_empty());
    }
}
