//! Notifications emitted by tracked jobs

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::job::AnalysisJob;

/// Receives job updates.
///
/// `on_complete` and `on_error` fire at most once per started job. Methods are
/// called with no registry lock held.
pub trait AnalysisObserver: Send + Sync {
    fn on_progress(&self, _job: &AnalysisJob) {}

    fn on_complete(&self, _session_id: &str, _with_warning: bool) {}

    fn on_error(&self, _session_id: &str, _message: &str) {}
}

/// Ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl AnalysisObserver for LoggingObserver {
    fn on_progress(&self, job: &AnalysisJob) {
        info!(
            "⏳ {}: {}% {}",
            job.session_id(),
            job.progress_percent(),
            job.status_message()
        );
    }

    fn on_complete(&self, session_id: &str, with_warning: bool) {
        if with_warning {
            warn!("⚠️  {}: Analysis completed with limitations.", session_id);
        } else {
            info!(
                "✅ {}: Analysis completed! View results in Reports or Results.",
                session_id
            );
        }
    }

    fn on_error(&self, session_id: &str, message: &str) {
        error!("❌ {}: {}", session_id, message);
    }
}

/// Tracker notification as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    Progress {
        session_id: String,
        progress: u8,
        message: String,
    },
    Completed {
        session_id: String,
        with_warning: bool,
    },
    Failed {
        session_id: String,
        message: String,
    },
}

impl TrackerEvent {
    pub fn session_id(&self) -> &str {
        match self {
            TrackerEvent::Progress { session_id, .. }
            | TrackerEvent::Completed { session_id, .. }
            | TrackerEvent::Failed { session_id, .. } => session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrackerEvent::Progress { .. })
    }
}

/// Forwards notifications into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: TrackerEvent) {
        // Receiver dropped means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl AnalysisObserver for ChannelObserver {
    fn on_progress(&self, job: &AnalysisJob) {
        self.send(TrackerEvent::Progress {
            session_id: job.session_id().to_string(),
            progress: job.progress_percent(),
            message: job.status_message().to_string(),
        });
    }

    fn on_complete(&self, session_id: &str, with_warning: bool) {
        self.send(TrackerEvent::Completed {
            session_id: session_id.to_string(),
            with_warning,
        });
    }

    fn on_error(&self, session_id: &str, message: &str) {
        self.send(TrackerEvent::Failed {
            session_id: session_id.to_string(),
            message: message.to_string(),
        });
    }
}

/// Fans notifications out to several observers in order
pub struct ObserverSet {
    observers: Vec<Box<dyn AnalysisObserver>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Box<dyn AnalysisObserver>>) -> Self {
        Self { observers }
    }
}

impl AnalysisObserver for ObserverSet {
    fn on_progress(&self, job: &AnalysisJob) {
        self.observers.iter().for_each(|o| o.on_progress(job));
    }

    fn on_complete(&self, session_id: &str, with_warning: bool) {
        self.observers
            .iter()
            .for_each(|o| o.on_complete(session_id, with_warning));
    }

    fn on_error(&self, session_id: &str, message: &str) {
        self.observers
            .iter()
            .for_each(|o| o.on_error(session_id, message));
    }
}
