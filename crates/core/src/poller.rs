//! Periodic status polling for one job at a time.
//!
//! A poll runs as a spawned task owning a [`CancellationToken`]. Starting a
//! new poll cancels the previous one, and a cancelled task never writes
//! state, so the watch channel only ever reflects the most recent job.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::service::JobService;
use crate::types::{Job, JobStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle,
    Polling {
        job_id: String,
        latest: Option<Job>,
    },
    Settled(Job),
}

impl PollState {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Polling { job_id, .. } => Some(job_id),
            Self::Settled(job) => Some(&job.id),
        }
    }

    /// Most recent snapshot of the tracked job, if any has been seen.
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::Idle => None,
            Self::Polling { latest, .. } => latest.as_ref(),
            Self::Settled(job) => Some(job),
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.job().map(|job| job.status)
    }
}

/// Side effects run once when a job reaches a terminal status.
#[async_trait]
pub trait SettleHook: Send + Sync {
    async fn on_settled(&self, job: &Job);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSettleHook;

#[async_trait]
impl SettleHook for NoopSettleHook {
    async fn on_settled(&self, _job: &Job) {}
}

struct ActivePoll {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct JobPoller {
    service: Arc<dyn JobService>,
    hook: Arc<dyn SettleHook>,
    interval: Duration,
    state: Arc<watch::Sender<PollState>>,
    active: Mutex<Option<ActivePoll>>,
}

impl JobPoller {
    pub fn new(service: Arc<dyn JobService>, hook: Arc<dyn SettleHook>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            service,
            hook,
            interval: interval.max(Duration::from_millis(1)),
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Begin polling `job_id`, replacing any poll already running. The first
    /// fetch happens one interval from now.
    pub fn start(&self, job_id: impl Into<String>) {
        self.launch(job_id.into(), None);
    }

    /// Like [`start`](Self::start) but seeds the state with a known snapshot.
    pub fn track(&self, job: Job) {
        self.launch(job.id.clone(), Some(job));
    }

    /// Requeue through the service, adopt the returned job and poll it again.
    pub async fn requeue(&self, job_id: &str) -> Result<Job, ApiError> {
        let job = self.service.requeue(job_id).await?;
        info!(job_id = %job.id, status = %job.status, "Job requeued");
        self.track(job.clone());
        Ok(job)
    }

    /// Stop the running poll, if any. The last state is kept.
    pub fn cancel(&self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(poll) = active.take() {
            poll.token.cancel();
            debug!("Job poll cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        active
            .as_ref()
            .is_some_and(|poll| !poll.token.is_cancelled() && !poll.handle.is_finished())
    }

    fn launch(&self, job_id: String, seed: Option<Job>) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = active.take() {
            previous.token.cancel();
        }

        let token = CancellationToken::new();
        self.state.send_replace(PollState::Polling {
            job_id: job_id.clone(),
            latest: seed,
        });

        let task = PollTask {
            service: self.service.clone(),
            hook: self.hook.clone(),
            state: self.state.clone(),
            interval: self.interval,
            job_id,
            token: token.clone(),
        };
        debug!(job_id = %task.job_id, interval_ms = self.interval.as_millis() as u64, "Job poll started");
        let handle = tokio::spawn(task.run());
        *active = Some(ActivePoll { token, handle });
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct PollTask {
    service: Arc<dyn JobService>,
    hook: Arc<dyn SettleHook>,
    state: Arc<watch::Sender<PollState>>,
    interval: Duration,
    job_id: String,
    token: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = self.token.cancelled() => return,
                result = self.service.get_job(&self.job_id) => result,
            };

            match fetched {
                Ok(job) if job.status.is_terminal() => {
                    if self.settle(job.clone()) {
                        info!(job_id = %job.id, status = %job.status, "Job settled");
                        self.hook.on_settled(&job).await;
                    }
                    return;
                }
                Ok(job) => self.record(job),
                Err(error) => {
                    warn!(job_id = %self.job_id, %error, "Job status fetch failed; retrying next tick");
                }
            }
        }
    }

    fn owns(&self, state: &PollState) -> bool {
        !self.token.is_cancelled() && state.job_id() == Some(self.job_id.as_str())
    }

    fn settle(&self, job: Job) -> bool {
        self.state.send_if_modified(|state| {
            if !self.owns(state) || matches!(state, PollState::Settled(_)) {
                return false;
            }
            *state = PollState::Settled(job);
            true
        })
    }

    fn record(&self, job: Job) {
        self.state.send_if_modified(|state| {
            if !self.owns(state) {
                return false;
            }
            let PollState::Polling { latest, .. } = state else {
                return false;
            };
            if let Some(previous) = latest.as_ref() {
                if !previous.status.can_advance_to(job.status, false) {
                    warn!(
                        job_id = %job.id,
                        from = %previous.status,
                        to = %job.status,
                        "Ignoring out-of-order job status"
                    );
                    return false;
                }
                if previous == &job {
                    return false;
                }
            }
            debug!(job_id = %job.id, status = %job.status, "Job status updated");
            *latest = Some(job);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_state_accessors() {
        assert_eq!(PollState::Idle.job_id(), None);

        let polling = PollState::Polling {
            job_id: "j1".to_string(),
            latest: None,
        };
        assert_eq!(polling.job_id(), Some("j1"));
        assert_eq!(polling.status(), None);

        let settled = PollState::Settled(Job::new("j1", JobStatus::Failed));
        assert_eq!(settled.status(), Some(JobStatus::Failed));
    }
}
