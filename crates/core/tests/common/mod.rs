#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use morphlyca_core::api::ApiError;
use morphlyca_core::poller::SettleHook;
use morphlyca_core::service::{FeatureCatalog, JobService};
use morphlyca_core::submission::JobSubmission;
use morphlyca_core::types::{Feature, Job, JobStatus, QuotaToday};

pub fn processor(name: &str, weight: u32) -> Feature {
    Feature {
        id: 0,
        name: name.to_string(),
        kind: "processor".to_string(),
        status: "ACTIVE".to_string(),
        weight,
        value: None,
        category: None,
        description: None,
        created_at: None,
    }
}

/// In-memory job service. `get_job` replays a script of statuses (`None`
/// is a transient failure) and then repeats the last status forever.
pub struct FakeJobService {
    pub features: Vec<Feature>,
    pub quota: Mutex<QuotaToday>,
    script: Mutex<VecDeque<Option<JobStatus>>>,
    last_status: Mutex<JobStatus>,
    pub fetched: Mutex<Vec<String>>,
    pub submissions: Mutex<Vec<JobSubmission>>,
    pub submit_delay: Duration,
    pub submit_error: Mutex<Option<ApiError>>,
    pub requeued: Mutex<Vec<String>>,
    pub quota_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fail_quota: AtomicBool,
    pub fail_history: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeJobService {
    pub fn new(features: Vec<Feature>, quota: QuotaToday) -> Self {
        Self {
            features,
            quota: Mutex::new(quota),
            script: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(JobStatus::Queued),
            fetched: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            submit_delay: Duration::ZERO,
            submit_error: Mutex::new(None),
            requeued: Mutex::new(Vec::new()),
            quota_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            fail_quota: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn script(&self, statuses: impl IntoIterator<Item = Option<JobStatus>>) {
        self.script.lock().unwrap().extend(statuses);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn set_quota(&self, quota: QuotaToday) {
        *self.quota.lock().unwrap() = quota;
    }
}

#[async_trait]
impl JobService for FakeJobService {
    async fn quota_today(&self) -> Result<QuotaToday, ApiError> {
        self.quota_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quota.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "quota service unavailable".to_string(),
            });
        }
        Ok(self.quota.lock().unwrap().clone())
    }

    async fn submit(&self, submission: &JobSubmission) -> Result<String, ApiError> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if let Some(error) = self.submit_error.lock().unwrap().take() {
            return Err(error);
        }
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn get_job(&self, id: &str) -> Result<Job, ApiError> {
        self.fetched.lock().unwrap().push(id.to_string());
        let next = self.script.lock().unwrap().pop_front();
        let status = match next {
            Some(Some(status)) => {
                *self.last_status.lock().unwrap() = status;
                status
            }
            Some(None) => return Err(ApiError::Network("connection reset".to_string())),
            None => *self.last_status.lock().unwrap(),
        };
        Ok(Job::new(id, status))
    }

    async fn requeue(&self, id: &str) -> Result<Job, ApiError> {
        self.requeued.lock().unwrap().push(id.to_string());
        *self.last_status.lock().unwrap() = JobStatus::Queued;
        Ok(Job::new(id, JobStatus::Queued))
    }

    async fn list_jobs(&self, take: u32, _skip: u32) -> Result<Vec<Job>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".to_string()));
        }
        let fetched = self.fetched.lock().unwrap();
        Ok(fetched
            .iter()
            .rev()
            .take(take as usize)
            .map(|id| Job::new(id.clone(), *self.last_status.lock().unwrap()))
            .collect())
    }
}

#[async_trait]
impl FeatureCatalog for FakeJobService {
    async fn all_features(&self) -> Result<Vec<Feature>, ApiError> {
        Ok(self.features.clone())
    }

    async fn face_swapper_models(&self) -> Vec<String> {
        vec!["inswapper_128".to_string()]
    }
}

#[derive(Default)]
pub struct CountingHook {
    pub settled: Mutex<Vec<Job>>,
}

impl CountingHook {
    pub fn count(&self) -> usize {
        self.settled.lock().unwrap().len()
    }
}

#[async_trait]
impl SettleHook for CountingHook {
    async fn on_settled(&self, job: &Job) {
        self.settled.lock().unwrap().push(job.clone());
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
