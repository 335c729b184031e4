//! State behind the job console: catalog, processor selection, uploads,
//! options, quota, recent jobs and the active poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::PollingConfig;
use crate::poller::{JobPoller, PollState, SettleHook};
use crate::quota::{self, ProcessorSelection, QuotaSummary, SubmitInputs};
use crate::service::{FeatureCatalog, JobService};
use crate::submission::{JobOptions, JobSubmission, SubmitError, UploadFile};
use crate::types::{Feature, Job, JobStatus, QuotaToday};

/// Quota and job history as last fetched from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    pub quota: Option<QuotaToday>,
    pub history: Vec<Job>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequeueError {
    #[error("there is no job to requeue")]
    NoJob,
    #[error("job {id} is {status}; only failed jobs can be requeued")]
    NotFailed { id: String, status: JobStatus },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Reloads quota and history once a job settles. Both are best effort.
struct RefreshOnSettle {
    service: Arc<dyn JobService>,
    dashboard: Arc<RwLock<Dashboard>>,
    history_take: u32,
}

#[async_trait]
impl SettleHook for RefreshOnSettle {
    async fn on_settled(&self, job: &Job) {
        refresh_quota(self.service.as_ref(), &self.dashboard).await;
        refresh_history(self.service.as_ref(), &self.dashboard, self.history_take).await;
        info!(job_id = %job.id, "Refreshed quota and history after settle");
    }
}

async fn refresh_quota(service: &dyn JobService, dashboard: &RwLock<Dashboard>) -> bool {
    match service.quota_today().await {
        Ok(quota) => {
            dashboard.write().unwrap_or_else(|p| p.into_inner()).quota = Some(quota);
            true
        }
        Err(error) => {
            warn!(%error, "Failed to refresh today's quota");
            false
        }
    }
}

async fn refresh_history(service: &dyn JobService, dashboard: &RwLock<Dashboard>, take: u32) -> bool {
    match service.list_jobs(take, 0).await {
        Ok(history) => {
            dashboard.write().unwrap_or_else(|p| p.into_inner()).history = history;
            true
        }
        Err(error) => {
            warn!(%error, "Failed to refresh job history");
            false
        }
    }
}

/// Clears the in-flight flag when a submit attempt ends, however it ends.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ExploreSession {
    service: Arc<dyn JobService>,
    catalog: Arc<dyn FeatureCatalog>,
    dashboard: Arc<RwLock<Dashboard>>,
    poller: JobPoller,
    history_take: u32,
    features: Vec<Feature>,
    face_swapper_models: Vec<String>,
    selection: ProcessorSelection,
    source: Option<UploadFile>,
    target: Option<UploadFile>,
    audio: Option<UploadFile>,
    options: JobOptions,
    submitting: AtomicBool,
}

impl ExploreSession {
    pub fn new(
        service: Arc<dyn JobService>,
        catalog: Arc<dyn FeatureCatalog>,
        poll_interval: Duration,
        history_take: u32,
    ) -> Self {
        let dashboard = Arc::new(RwLock::new(Dashboard::default()));
        let hook = Arc::new(RefreshOnSettle {
            service: service.clone(),
            dashboard: dashboard.clone(),
            history_take,
        });
        let poller = JobPoller::new(service.clone(), hook, poll_interval);

        Self {
            service,
            catalog,
            dashboard,
            poller,
            history_take,
            features: Vec::new(),
            face_swapper_models: Vec::new(),
            selection: ProcessorSelection::default(),
            source: None,
            target: None,
            audio: None,
            options: JobOptions::default(),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn with_client(client: Arc<ApiClient>, polling: &PollingConfig) -> Self {
        Self::new(client.clone(), client, polling.interval(), polling.history_take)
    }

    /// Fetch the catalog (required), then quota, history and model list
    /// (best effort). Resets the selection to the defaults.
    pub async fn load(&mut self) -> Result<(), ApiError> {
        self.features = self.catalog.all_features().await?;
        self.selection = ProcessorSelection::with_defaults(&self.features);
        self.face_swapper_models = self.catalog.face_swapper_models().await;
        self.refresh().await;
        info!(
            features = self.features.len(),
            processors = self.processors().count(),
            "Explore session loaded"
        );
        Ok(())
    }

    /// Reload quota and history; returns whether both succeeded.
    pub async fn refresh(&self) -> bool {
        let quota = refresh_quota(self.service.as_ref(), &self.dashboard).await;
        let history = refresh_history(self.service.as_ref(), &self.dashboard, self.history_take).await;
        quota && history
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Processors offered for selection: type `processor`, status `ACTIVE`.
    pub fn processors(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(|feature| feature.is_active_processor())
    }

    pub fn face_swapper_models(&self) -> &[String] {
        &self.face_swapper_models
    }

    pub fn selection(&self) -> &ProcessorSelection {
        &self.selection
    }

    pub fn toggle_processor(&mut self, name: &str) -> bool {
        self.selection.toggle(name)
    }

    pub fn set_processor(&mut self, name: &str, checked: bool) {
        self.selection.set(name, checked);
    }

    pub fn set_source(&mut self, file: Option<UploadFile>) {
        self.source = file;
    }

    pub fn set_target(&mut self, file: Option<UploadFile>) {
        self.target = file;
    }

    pub fn set_audio(&mut self, file: Option<UploadFile>) {
        self.audio = file;
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut JobOptions {
        &mut self.options
    }

    pub fn dashboard(&self) -> Dashboard {
        self.dashboard.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn quota(&self) -> Option<QuotaToday> {
        self.dashboard().quota
    }

    pub fn summary(&self) -> QuotaSummary {
        let dashboard = self.dashboard.read().unwrap_or_else(|p| p.into_inner());
        quota::summarize(self.processors(), &self.selection, dashboard.quota.as_ref())
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    pub fn can_submit(&self) -> bool {
        quota::can_submit(&self.summary(), self.submit_inputs())
    }

    fn submit_inputs(&self) -> SubmitInputs {
        SubmitInputs {
            has_source: self.source.is_some(),
            has_target: self.target.is_some(),
            submitting: self.is_submitting(),
        }
    }

    /// Submit the current form and start polling the new job. Quota is only
    /// re-read from the server, never adjusted locally.
    pub async fn submit(&self) -> Result<String, SubmitError> {
        let _guard = SubmitGuard::acquire(&self.submitting).ok_or(SubmitError::AlreadySubmitting)?;

        let summary = self.summary();
        let inputs = SubmitInputs {
            submitting: false,
            ..self.submit_inputs()
        };
        if !quota::can_submit(&summary, inputs) {
            return Err(SubmitError::NotReady);
        }
        let (Some(source), Some(target)) = (self.source.clone(), self.target.clone()) else {
            return Err(SubmitError::NotReady);
        };

        let submission = JobSubmission {
            source,
            target,
            audio: self.audio.clone(),
            processors: self.selection.enabled_names(self.processors()),
            options: self.options.clone(),
        };

        let job_id = self.service.submit(&submission).await.map_err(|error| {
            let error = SubmitError::from(error);
            warn!(%error, "Job submission failed");
            error
        })?;

        self.poller.track(Job::new(job_id.clone(), JobStatus::Queued));
        Ok(job_id)
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    pub fn job_state(&self) -> PollState {
        self.poller.state()
    }

    /// Requeue the tracked job. Only a job last seen as FAILED qualifies.
    pub async fn requeue(&self) -> Result<Job, RequeueError> {
        let state = self.poller.state();
        let job = state.job().ok_or(RequeueError::NoJob)?;
        if job.status != JobStatus::Failed {
            return Err(RequeueError::NotFailed {
                id: job.id.clone(),
                status: job.status,
            });
        }
        Ok(self.poller.requeue(&job.id).await?)
    }

    /// Stop polling; called when the console goes away.
    pub fn teardown(&self) {
        self.poller.cancel();
    }
}
