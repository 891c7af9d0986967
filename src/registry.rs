//! Multi-session analysis tracking for list views
//!
//! The registry owns every tracked [`AnalysisJob`] together with its poll
//! task. Poll tasks only hold a weak reference back to the registry, so
//! dropping the registry stops all of them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::models::prepare_session_list;
use crate::api::{AnalysisApi, AnalysisStatus, AnalyzeResponse, SessionSummary};
use crate::config::PollingConfig;
use crate::credentials::CredentialProvider;
use crate::tracker::{
    normalize_error, AnalysisJob, AnalysisObserver, JobState, NoopObserver, Scheduler, Ticker,
    TokioScheduler, Transition,
};
use crate::{Result, TrackerError};

/// Result of asking the registry to start an analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Backend accepted the job and polling began
    Started,

    /// Analysis is already running server-side
    AlreadyRunning,

    /// This registry is already tracking the session
    AlreadyTracked,

    AlreadyCompleted { with_warning: bool },

    /// Earlier attempt failed; carries the error. Cleared by `reset`.
    PreviouslyFailed(String),

    /// Backend refused to start the job
    Failed(String),

    /// Tracking was cancelled while the start request was in flight
    Cancelled,
}

impl StartOutcome {
    /// Notice to show the user
    pub fn message(&self) -> String {
        match self {
            StartOutcome::Started => "Analysis started".to_string(),
            StartOutcome::AlreadyRunning => "Analysis already in progress".to_string(),
            StartOutcome::AlreadyTracked => "This video is already being analyzed".to_string(),
            StartOutcome::AlreadyCompleted { with_warning: false } => {
                "Analysis already completed".to_string()
            }
            StartOutcome::AlreadyCompleted { with_warning: true } => {
                "Analysis already completed (with warnings)".to_string()
            }
            StartOutcome::PreviouslyFailed(message) | StartOutcome::Failed(message) => {
                message.clone()
            }
            StartOutcome::Cancelled => "Analysis tracking was cancelled".to_string(),
        }
    }

    /// Only a fresh refusal is an error; everything else is informational
    pub fn is_error(&self) -> bool {
        matches!(self, StartOutcome::Failed(_))
    }
}

/// Outcome remembered after a job leaves polling
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Completed { with_warning: bool },
    Failed(String),
}

/// Owned poll task; aborted when dropped
struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Let the task run to its own end instead of aborting it
    fn detach(mut self) {
        self.task.take();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct JobEntry {
    job: AnalysisJob,
    /// Distinguishes this run from earlier runs of the same session
    epoch: u64,
    poll_handle: Option<PollHandle>,
}

impl JobEntry {
    /// Release the poll task. Safe to call more than once.
    fn release_poll_handle(&mut self, from_loop: bool) {
        if let Some(handle) = self.poll_handle.take() {
            if from_loop {
                handle.detach();
            }
        }
    }
}

#[derive(Default)]
struct Jobs {
    entries: HashMap<String, JobEntry>,
    resolved: HashMap<String, Resolution>,
}

impl Jobs {
    fn polling_mut(&mut self, session_id: &str, epoch: u64) -> Option<&mut JobEntry> {
        self.entries
            .get_mut(session_id)
            .filter(|e| e.epoch == epoch && e.job.state() == JobState::Polling)
    }
}

enum Notification {
    Progress(AnalysisJob),
    Completed { session_id: String, with_warning: bool },
    Failed { session_id: String, message: String },
}

struct Inner {
    api: Arc<dyn AnalysisApi>,
    credentials: Arc<dyn CredentialProvider>,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn AnalysisObserver>,
    interval: Duration,
    max_duration: Option<Duration>,
    jobs: RwLock<Jobs>,
    next_epoch: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn next_epoch(&self) -> u64 {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Progress(job) => self.observer.on_progress(&job),
            Notification::Completed {
                session_id,
                with_warning,
            } => self.observer.on_complete(&session_id, with_warning),
            Notification::Failed {
                session_id,
                message,
            } => self.observer.on_error(&session_id, &message),
        }
    }

    /// Poll immediately, then once per scheduler tick until the job leaves `Polling`
    fn spawn_poll_loop(
        self: &Arc<Self>,
        session_id: String,
        epoch: u64,
        mut ticker: Box<dyn Ticker>,
    ) -> PollHandle {
        let weak = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let keep_polling = inner.poll_once(&session_id, epoch, true).await;
                drop(inner);

                if !keep_polling {
                    debug!("Poll loop for {} finished", session_id);
                    break;
                }
                ticker.tick().await;
            }
        });

        PollHandle { task: Some(task) }
    }

    /// One status fetch and transition. Returns whether polling should continue.
    async fn poll_once(&self, session_id: &str, epoch: u64, from_loop: bool) -> bool {
        {
            let jobs = self.jobs.read().await;
            let current = jobs
                .entries
                .get(session_id)
                .is_some_and(|e| e.epoch == epoch && e.job.state() == JobState::Polling);
            if !current || self.is_closed() {
                return false;
            }
        }

        let Some(token) = self.credentials.bearer_token() else {
            warn!(
                "🔒 No credential available, stopping analysis tracking for {}",
                session_id
            );
            let mut guard = self.jobs.write().await;
            let jobs = &mut *guard;
            if let Some(entry) = jobs.polling_mut(session_id, epoch) {
                entry.job.stop();
                entry.release_poll_handle(from_loop);
                jobs.entries.remove(session_id);
            }
            return false;
        };

        let result = self.api.fetch_progress(&token, session_id).await;

        let keep_polling;
        let notification;
        {
            let mut guard = self.jobs.write().await;
            let jobs = &mut *guard;

            if self.is_closed() {
                return false;
            }
            let Some(entry) = jobs.polling_mut(session_id, epoch) else {
                debug!("Discarding stale progress response for {}", session_id);
                return false;
            };

            let mut transition = match result {
                Ok(response) => entry.job.apply_progress(&response),
                Err(e) => {
                    // Fetch errors never end the job; the next tick retries
                    if e.is_transient() {
                        warn!("Progress polling error for {}: {}", session_id, e);
                    } else {
                        error!("Progress polling error for {}: {}", session_id, e);
                    }
                    Transition::Retry
                }
            };

            if transition.keeps_polling() {
                if let Some(timed_out) = entry.job.check_deadline(Instant::now(), self.max_duration)
                {
                    transition = timed_out;
                }
            }

            keep_polling = transition.keeps_polling();
            if !keep_polling {
                entry.release_poll_handle(from_loop);
            }

            notification = match transition {
                Transition::Progress => {
                    debug!(
                        "📊 {}: {}% {}",
                        session_id,
                        entry.job.progress_percent(),
                        entry.job.status_message()
                    );
                    Some(Notification::Progress(entry.job.clone()))
                }
                Transition::Retry | Transition::Ignored => None,
                Transition::Completed { with_warning } => {
                    let first = entry.job.mark_notified();
                    jobs.entries.remove(session_id);
                    jobs.resolved.insert(
                        session_id.to_string(),
                        Resolution::Completed { with_warning },
                    );
                    info!("🎉 Analysis finished for {}", session_id);
                    first.then(|| Notification::Completed {
                        session_id: session_id.to_string(),
                        with_warning,
                    })
                }
                Transition::Failed(message) => {
                    let first = entry.job.mark_notified();
                    jobs.resolved
                        .insert(session_id.to_string(), Resolution::Failed(message.clone()));
                    error!("Analysis failed for {}: {}", session_id, message);
                    first.then(|| Notification::Failed {
                        session_id: session_id.to_string(),
                        message,
                    })
                }
                Transition::Stopped => {
                    warn!("Backend reports {} as not started, stopping", session_id);
                    jobs.entries.remove(session_id);
                    None
                }
            };
        }

        if let Some(notification) = notification {
            self.notify(notification);
        }
        keep_polling
    }
}

/// Registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub active_jobs: usize,
    pub starting: usize,
    pub polling: usize,
    pub failed_unacknowledged: usize,
    pub resolved: usize,
}

/// Tracks analysis jobs for every session shown in a list view
pub struct AnalysisJobRegistry {
    inner: Arc<Inner>,
}

impl AnalysisJobRegistry {
    pub fn builder(
        api: Arc<dyn AnalysisApi>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> RegistryBuilder {
        RegistryBuilder::new(api, credentials)
    }

    /// Start analysis of a session.
    ///
    /// `cached_status` is what the caller last saw from the backend. Completed,
    /// processing and failed sessions short-circuit without any request; a
    /// session already tracked here is never started twice.
    pub async fn start(
        &self,
        session_id: &str,
        cached_status: &AnalysisStatus,
        cached_error: Option<&str>,
    ) -> Result<StartOutcome> {
        match cached_status {
            AnalysisStatus::Completed => {
                return Ok(StartOutcome::AlreadyCompleted {
                    with_warning: false,
                })
            }
            AnalysisStatus::CompletedWithWarning => {
                return Ok(StartOutcome::AlreadyCompleted { with_warning: true })
            }
            AnalysisStatus::Processing => return Ok(StartOutcome::AlreadyRunning),
            AnalysisStatus::Failed => {
                return Ok(StartOutcome::PreviouslyFailed(normalize_error(cached_error)))
            }
            AnalysisStatus::NotStarted | AnalysisStatus::Other(_) => {}
        }

        let (token, epoch) = {
            let mut jobs = self.inner.jobs.write().await;

            if let Some(entry) = jobs.entries.get(session_id) {
                return Ok(match (entry.job.state(), entry.job.error_detail()) {
                    (JobState::Failed, Some(error)) => {
                        StartOutcome::PreviouslyFailed(error.to_string())
                    }
                    _ => StartOutcome::AlreadyTracked,
                });
            }

            match jobs.resolved.get(session_id) {
                Some(Resolution::Completed { with_warning }) => {
                    return Ok(StartOutcome::AlreadyCompleted {
                        with_warning: *with_warning,
                    })
                }
                Some(Resolution::Failed(message)) => {
                    return Ok(StartOutcome::PreviouslyFailed(message.clone()))
                }
                None => {}
            }

            let token = self
                .inner
                .credentials
                .bearer_token()
                .ok_or(TrackerError::MissingCredential)?;

            let epoch = self.inner.next_epoch();
            let mut job = AnalysisJob::new(session_id);
            job.begin_start();
            jobs.entries.insert(
                session_id.to_string(),
                JobEntry {
                    job,
                    epoch,
                    poll_handle: None,
                },
            );
            (token, epoch)
        };

        info!("🚀 Starting analysis for {}", session_id);
        match self.inner.api.start_analysis(&token, session_id).await {
            Ok(response) => Ok(self.apply_start_response(session_id, epoch, response).await),
            Err(e) => {
                warn!("Analysis start error for {}: {}", session_id, e);
                let mut jobs = self.inner.jobs.write().await;
                if jobs.entries.get(session_id).is_some_and(|e| e.epoch == epoch) {
                    jobs.entries.remove(session_id);
                }
                Err(e)
            }
        }
    }

    /// Start analysis using the status carried by a listed session
    pub async fn start_session(&self, session: &SessionSummary) -> Result<StartOutcome> {
        self.start(
            &session.id,
            &session.status(),
            session.analysis_error.as_deref(),
        )
        .await
    }

    async fn apply_start_response(
        &self,
        session_id: &str,
        epoch: u64,
        response: AnalyzeResponse,
    ) -> StartOutcome {
        let mut failure = None;
        let outcome = {
            let mut guard = self.inner.jobs.write().await;
            let jobs = &mut *guard;

            let Some(entry) = jobs
                .entries
                .get_mut(session_id)
                .filter(|e| e.epoch == epoch && e.job.state() == JobState::Starting)
            else {
                debug!("Start of {} was cancelled before the backend answered", session_id);
                return StartOutcome::Cancelled;
            };

            if response.already_completed {
                jobs.entries.remove(session_id);
                jobs.resolved.insert(
                    session_id.to_string(),
                    Resolution::Completed {
                        with_warning: false,
                    },
                );
                StartOutcome::AlreadyCompleted {
                    with_warning: false,
                }
            } else if response.in_progress || !response.is_rejection() {
                let ticker = self.inner.scheduler.ticker(self.inner.interval);
                entry.job.begin_polling(Instant::now());
                entry.poll_handle =
                    Some(self.inner.spawn_poll_loop(session_id.to_string(), epoch, ticker));
                if response.in_progress {
                    StartOutcome::AlreadyRunning
                } else {
                    StartOutcome::Started
                }
            } else {
                let raw = if response.video_too_short {
                    Some("video is too short")
                } else {
                    response.error.as_deref().or(response.message.as_deref())
                };
                let message = normalize_error(raw);
                entry.job.fail(message.clone());
                if entry.job.mark_notified() {
                    failure = Some(message.clone());
                }
                jobs.resolved
                    .insert(session_id.to_string(), Resolution::Failed(message.clone()));
                error!("Analysis rejected for {}: {}", session_id, message);
                StartOutcome::Failed(message)
            }
        };

        if let Some(message) = failure {
            self.inner.observer.on_error(session_id, &message);
        }
        outcome
    }

    /// Run one poll tick for a session outside its loop
    pub async fn tick(&self, session_id: &str) -> bool {
        let epoch = {
            let jobs = self.inner.jobs.read().await;
            match jobs.entries.get(session_id) {
                Some(entry) if entry.job.state() == JobState::Polling => entry.epoch,
                _ => return false,
            }
        };
        self.inner.poll_once(session_id, epoch, false).await
    }

    /// Adopt every listed session the backend reports as processing.
    ///
    /// Sessions with a remembered outcome are skipped; only `reset` or
    /// `delete_session` makes them eligible again. Returns how many sessions
    /// were newly tracked.
    pub async fn reconcile(&self, sessions: &[SessionSummary]) -> usize {
        let mut guard = self.inner.jobs.write().await;
        let jobs = &mut *guard;
        let mut adopted = 0;

        for session in sessions
            .iter()
            .filter(|s| s.status() == AnalysisStatus::Processing)
        {
            if jobs.entries.contains_key(&session.id) {
                continue;
            }
            if jobs.resolved.contains_key(&session.id) {
                debug!("Not adopting {}: outcome already reported", session.id);
                continue;
            }

            let epoch = self.inner.next_epoch();
            let ticker = self.inner.scheduler.ticker(self.inner.interval);
            let mut job = AnalysisJob::new(session.id.clone());
            job.begin_polling(Instant::now());
            let poll_handle = self.inner.spawn_poll_loop(session.id.clone(), epoch, ticker);

            jobs.entries.insert(
                session.id.clone(),
                JobEntry {
                    job,
                    epoch,
                    poll_handle: Some(poll_handle),
                },
            );
            adopted += 1;
        }

        if adopted > 0 {
            info!("🔄 Resumed tracking for {} session(s) already processing", adopted);
        }
        adopted
    }

    /// Fetch the session list, keep rows with a video (newest first) and reconcile
    pub async fn refresh(&self) -> Result<Vec<SessionSummary>> {
        let token = self
            .inner
            .credentials
            .bearer_token()
            .ok_or(TrackerError::MissingCredential)?;

        let sessions = prepare_session_list(self.inner.api.list_sessions(&token).await?);
        debug!("📋 Listed {} sessions", sessions.len());

        self.reconcile(&sessions).await;
        Ok(sessions)
    }

    /// Delete a session on the backend and forget any tracking for it
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let token = self
            .inner
            .credentials
            .bearer_token()
            .ok_or(TrackerError::MissingCredential)?;

        self.inner.api.delete_session(&token, session_id).await?;

        let mut jobs = self.inner.jobs.write().await;
        jobs.entries.remove(session_id);
        jobs.resolved.remove(session_id);

        info!("🗑️ Deleted session {}", session_id);
        Ok(())
    }

    /// Stop tracking a session regardless of its state. Returns false if it was not tracked.
    pub async fn cancel(&self, session_id: &str) -> bool {
        let removed = self.inner.jobs.write().await.entries.remove(session_id);
        if removed.is_some() {
            debug!("Cancelled tracking for {}", session_id);
        }
        removed.is_some()
    }

    /// Drop a failed job from the active set once the user has seen the error.
    ///
    /// The failure stays remembered; `start` keeps refusing until `reset`.
    pub async fn acknowledge_failure(&self, session_id: &str) -> bool {
        let mut jobs = self.inner.jobs.write().await;
        let failed = jobs
            .entries
            .get(session_id)
            .is_some_and(|e| e.job.state() == JobState::Failed);
        if failed {
            jobs.entries.remove(session_id);
        }
        failed
    }

    /// Forget everything about a session, e.g. after a new upload
    pub async fn reset(&self, session_id: &str) {
        let mut jobs = self.inner.jobs.write().await;
        jobs.entries.remove(session_id);
        jobs.resolved.remove(session_id);
    }

    /// Stop every poll loop
    pub async fn shutdown(&self) {
        let mut jobs = self.inner.jobs.write().await;
        let count = jobs.entries.len();
        jobs.entries.clear();
        if count > 0 {
            info!("🛑 Stopped tracking {} session(s)", count);
        }
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<AnalysisJob> {
        self.inner
            .jobs
            .read()
            .await
            .entries
            .get(session_id)
            .map(|e| e.job.clone())
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.inner.jobs.read().await.entries.contains_key(session_id)
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.jobs.read().await.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn stats(&self) -> RegistryStats {
        let jobs = self.inner.jobs.read().await;
        let count = |state: JobState| {
            jobs.entries
                .values()
                .filter(|e| e.job.state() == state)
                .count()
        };

        RegistryStats {
            active_jobs: jobs.entries.len(),
            starting: count(JobState::Starting),
            polling: count(JobState::Polling),
            failed_unacknowledged: count(JobState::Failed),
            resolved: jobs.resolved.len(),
        }
    }
}

impl Drop for AnalysisJobRegistry {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
        // Poll tasks notice `closed` on their own if the lock is busy
        if let Ok(mut jobs) = self.inner.jobs.try_write() {
            jobs.entries.clear();
        }
    }
}

/// Builder for [`AnalysisJobRegistry`]
pub struct RegistryBuilder {
    api: Arc<dyn AnalysisApi>,
    credentials: Arc<dyn CredentialProvider>,
    scheduler: Arc<dyn Scheduler>,
    observer: Arc<dyn AnalysisObserver>,
    interval: Duration,
    max_duration: Option<Duration>,
}

impl RegistryBuilder {
    pub fn new(api: Arc<dyn AnalysisApi>, credentials: Arc<dyn CredentialProvider>) -> Self {
        let polling = PollingConfig::default();
        Self {
            api,
            credentials,
            scheduler: Arc::new(TokioScheduler),
            observer: Arc::new(NoopObserver),
            interval: polling.interval(),
            max_duration: polling.max_duration(),
        }
    }

    pub fn with_scheduler<S: Scheduler + 'static>(mut self, scheduler: S) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    pub fn with_observer<O: AnalysisObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn with_polling(mut self, polling: &PollingConfig) -> Self {
        self.interval = polling.interval();
        self.max_duration = polling.max_duration();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn build(self) -> AnalysisJobRegistry {
        let interval = if self.interval.is_zero() {
            let fallback = PollingConfig::default().interval();
            warn!(
                "Poll interval must be non-zero, using {}ms",
                fallback.as_millis()
            );
            fallback
        } else {
            self.interval
        };

        AnalysisJobRegistry {
            inner: Arc::new(Inner {
                api: self.api,
                credentials: self.credentials,
                scheduler: self.scheduler,
                observer: self.observer,
                interval,
                max_duration: self.max_duration,
                jobs: RwLock::new(Jobs::default()),
                next_epoch: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }
}
