//! Per-session analysis state machine

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::messages::{self, normalize_error};
use crate::api::ProgressResponse;

/// Lifecycle states of a tracked analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Not tracked, or stopped without an outcome
    NotStarted,

    /// Analyze request sent, waiting for the backend to accept it
    Starting,

    /// Backend accepted the job, status is fetched on every tick
    Polling,

    CompletedOk,

    CompletedWithWarning,

    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::CompletedOk | JobState::CompletedWithWarning | JobState::Failed
        )
    }
}

/// What a single poll response did to the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Job was not polling; the response is stale and was dropped
    Ignored,

    /// Still polling, progress or message may have changed
    Progress,

    /// Status fetch failed; nothing changed, try again next tick
    Retry,

    Completed { with_warning: bool },

    Failed(String),

    /// Backend says the job never started; stop without an outcome
    Stopped,
}

impl Transition {
    pub fn keeps_polling(&self) -> bool {
        matches!(self, Transition::Progress | Transition::Retry)
    }
}

/// Client-side view of one session's analysis
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    session_id: String,
    state: JobState,
    progress_percent: u8,
    status_message: String,
    error_detail: Option<String>,
    polling_since: Option<Instant>,
    notified: bool,
}

impl AnalysisJob {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: JobState::NotStarted,
            progress_percent: 0,
            status_message: String::new(),
            error_detail: None,
            polling_since: None,
            notified: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn begin_start(&mut self) {
        self.state = JobState::Starting;
        self.progress_percent = 0;
        self.status_message = messages::STARTING_MESSAGE.to_string();
        self.error_detail = None;
        self.notified = false;
    }

    /// Enter `Polling`; the poll ceiling is measured from here
    pub fn begin_polling(&mut self, now: Instant) {
        if self.state == JobState::NotStarted {
            self.status_message = messages::RESUMED_MESSAGE.to_string();
        }
        self.state = JobState::Polling;
        self.polling_since = Some(now);
    }

    /// Apply one progress response.
    ///
    /// A failure report wins over everything else, including a `processing`
    /// status sent alongside a trailing error.
    pub fn apply_progress(&mut self, response: &ProgressResponse) -> Transition {
        if self.state != JobState::Polling {
            return Transition::Ignored;
        }

        let status = response.status_str();

        if status == "failed" || response.error_text().is_some() {
            let raw = response.error_text().or_else(|| {
                response
                    .message
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
            });
            return self.fail(normalize_error(raw));
        }

        self.progress_percent = self.progress_percent.max(response.progress_percent());
        // Every response replaces the status text, even with nothing
        self.status_message = response.message.clone().unwrap_or_default();

        if status.contains("completed") || response.completed == Some(true) {
            self.progress_percent = 100;
            self.polling_since = None;
            let with_warning = status == "completed_with_warning";
            if with_warning {
                self.state = JobState::CompletedWithWarning;
                self.status_message = messages::WARNING_MESSAGE.to_string();
            } else {
                self.state = JobState::CompletedOk;
                self.status_message = messages::COMPLETED_MESSAGE.to_string();
            }
            return Transition::Completed { with_warning };
        }

        if status == "not_started" {
            self.stop();
            return Transition::Stopped;
        }

        Transition::Progress
    }

    /// Fail with an already normalized message
    pub fn fail(&mut self, message: String) -> Transition {
        self.state = JobState::Failed;
        self.progress_percent = 0;
        self.polling_since = None;
        self.status_message = message.clone();
        self.error_detail = Some(message.clone());
        Transition::Failed(message)
    }

    /// Fail the job if it has been polling longer than `limit`
    pub fn check_deadline(&mut self, now: Instant, limit: Option<Duration>) -> Option<Transition> {
        let (limit, since) = (limit?, self.polling_since?);
        if self.state != JobState::Polling || now.duration_since(since) < limit {
            return None;
        }
        Some(self.fail(messages::timeout_message(limit)))
    }

    pub fn stop(&mut self) {
        self.state = JobState::NotStarted;
        self.polling_since = None;
    }

    /// Returns true exactly once per start, the first time an outcome is reported
    pub fn mark_notified(&mut self) -> bool {
        if self.notified || !self.state.is_terminal() {
            return false;
        }
        self.notified = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polling_job() -> AnalysisJob {
        let mut job = AnalysisJob::new("s1");
        job.begin_start();
        job.begin_polling(Instant::now());
        job
    }

    #[test]
    fn test_error_wins_over_processing() {
        let mut job = polling_job();
        let resp = ProgressResponse::processing(60.0, "Analyzing video...")
            .with_error("Analysis failed: Could not read audio track");

        assert_eq!(
            job.apply_progress(&resp),
            Transition::Failed("Could not read audio track".to_string())
        );
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.progress_percent(), 0);
        assert_eq!(job.error_detail(), Some("Could not read audio track"));
    }

    #[test]
    fn test_failed_status_without_error_uses_message() {
        let mut job = polling_job();
        let resp = ProgressResponse {
            status: Some("failed".to_string()),
            message: Some("Analysis failed: video is too short".to_string()),
            ..Default::default()
        };
        assert_eq!(
            job.apply_progress(&resp),
            Transition::Failed(messages::SHORT_VIDEO_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = polling_job();
        job.apply_progress(&ProgressResponse::processing(45.0, "Analyzing text..."));
        job.apply_progress(&ProgressResponse::processing(30.0, "Analyzing audio..."));

        assert_eq!(job.progress_percent(), 45);
        assert_eq!(job.status_message(), "Analyzing audio...");
    }

    #[test]
    fn test_missing_message_clears_status_text() {
        let mut job = polling_job();
        job.apply_progress(&ProgressResponse::processing(20.0, "Transcribing..."));
        assert_eq!(job.status_message(), "Transcribing...");

        let resp = ProgressResponse {
            status: Some("processing".to_string()),
            progress: Some(25.0),
            ..Default::default()
        };
        assert_eq!(job.apply_progress(&resp), Transition::Progress);
        assert_eq!(job.status_message(), "");
        assert_eq!(job.progress_percent(), 25);
    }

    #[test]
    fn test_completion_variants() {
        let mut job = polling_job();
        let t = job.apply_progress(&ProgressResponse::with_status("completed_with_warning"));
        assert_eq!(t, Transition::Completed { with_warning: true });
        assert_eq!(job.state(), JobState::CompletedWithWarning);
        assert_eq!(job.progress_percent(), 100);

        let mut job = polling_job();
        let resp = ProgressResponse {
            status: Some("processing".to_string()),
            completed: Some(true),
            ..Default::default()
        };
        assert_eq!(
            job.apply_progress(&resp),
            Transition::Completed { with_warning: false }
        );
        assert_eq!(job.state(), JobState::CompletedOk);
        assert_eq!(job.status_message(), messages::COMPLETED_MESSAGE);
    }

    #[test]
    fn test_not_started_stops_without_outcome() {
        let mut job = polling_job();
        assert_eq!(
            job.apply_progress(&ProgressResponse::with_status("not_started")),
            Transition::Stopped
        );
        assert_eq!(job.state(), JobState::NotStarted);
        assert!(!job.mark_notified());
    }

    #[test]
    fn test_terminal_job_ignores_late_responses() {
        let mut job = polling_job();
        job.apply_progress(&ProgressResponse::with_status("completed"));
        assert!(job.mark_notified());

        assert_eq!(
            job.apply_progress(&ProgressResponse::with_status("completed")),
            Transition::Ignored
        );
        assert_eq!(
            job.apply_progress(&ProgressResponse::with_status("failed")),
            Transition::Ignored
        );
        assert_eq!(job.state(), JobState::CompletedOk);
        assert!(!job.mark_notified());
    }

    #[test]
    fn test_deadline() {
        let start = Instant::now();
        let mut job = AnalysisJob::new("s1");
        job.begin_polling(start);

        let limit = Some(Duration::from_secs(60));
        assert!(job.check_deadline(start + Duration::from_secs(59), limit).is_none());
        assert!(job.check_deadline(start + Duration::from_secs(600), None).is_none());

        let t = job.check_deadline(start + Duration::from_secs(60), limit);
        assert!(matches!(t, Some(Transition::Failed(_))));
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn test_resumed_job_message() {
        let mut job = AnalysisJob::new("s1");
        job.begin_polling(Instant::now());
        assert_eq!(job.status_message(), messages::RESUMED_MESSAGE);
        assert_eq!(job.state(), JobState::Polling);
    }
}
