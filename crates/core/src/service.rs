//! Seams between the workflow (session, poller) and the REST client, so the
//! workflow can be driven by an in-memory service in tests.

use async_trait::async_trait;

use crate::api::{ApiClient, ApiError};
use crate::submission::JobSubmission;
use crate::types::{Feature, Job, QuotaToday};

/// Job lifecycle operations: submit returns a job id, status is polled.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn quota_today(&self) -> Result<QuotaToday, ApiError>;

    /// Submit and return the new job id.
    async fn submit(&self, submission: &JobSubmission) -> Result<String, ApiError>;

    async fn get_job(&self, id: &str) -> Result<Job, ApiError>;

    async fn requeue(&self, id: &str) -> Result<Job, ApiError>;

    /// Most recent jobs first.
    async fn list_jobs(&self, take: u32, skip: u32) -> Result<Vec<Job>, ApiError>;
}

#[async_trait]
pub trait FeatureCatalog: Send + Sync {
    async fn all_features(&self) -> Result<Vec<Feature>, ApiError>;

    /// Never fails; falls back to a built-in list.
    async fn face_swapper_models(&self) -> Vec<String>;
}

#[async_trait]
impl JobService for ApiClient {
    async fn quota_today(&self) -> Result<QuotaToday, ApiError> {
        ApiClient::quota_today(self).await
    }

    async fn submit(&self, submission: &JobSubmission) -> Result<String, ApiError> {
        self.create_uploaded_process(submission).await
    }

    async fn get_job(&self, id: &str) -> Result<Job, ApiError> {
        ApiClient::get_job(self, id).await
    }

    async fn requeue(&self, id: &str) -> Result<Job, ApiError> {
        self.requeue_job(id).await
    }

    async fn list_jobs(&self, take: u32, skip: u32) -> Result<Vec<Job>, ApiError> {
        ApiClient::list_jobs(self, take, skip).await
    }
}

#[async_trait]
impl FeatureCatalog for ApiClient {
    async fn all_features(&self) -> Result<Vec<Feature>, ApiError> {
        ApiClient::all_features(self).await
    }

    async fn face_swapper_models(&self) -> Vec<String> {
        ApiClient::face_swapper_models(self).await
    }
}
