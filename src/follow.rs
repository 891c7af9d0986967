//! Waiting on tracked sessions until each one has an outcome

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::registry::AnalysisJobRegistry;
use crate::tracker::TrackerEvent;

/// What happened to the followed sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowSummary {
    pub completed: usize,
    pub failed: usize,
    /// Sessions that stopped being tracked without an outcome
    pub stopped: usize,
    pub interrupted: bool,
}

/// Bookkeeping for a set of followed sessions.
///
/// A job leaves the registry's active set before its outcome event is
/// delivered, so a session is only given up on after it is missing from two
/// consecutive checks.
#[derive(Debug, Default)]
pub struct FollowState {
    pending: HashSet<String>,
    missing: HashSet<String>,
    summary: FollowSummary,
}

impl FollowState {
    pub fn new(sessions: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: sessions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn record(&mut self, event: &TrackerEvent) {
        if !event.is_terminal() || !self.pending.remove(event.session_id()) {
            return;
        }
        self.missing.remove(event.session_id());

        match event {
            TrackerEvent::Completed { .. } => self.summary.completed += 1,
            TrackerEvent::Failed { .. } => self.summary.failed += 1,
            TrackerEvent::Progress { .. } => {}
        }
    }

    /// Compare pending sessions with the registry's active set.
    ///
    /// Returns the sessions given up on by this check.
    pub fn check_active(&mut self, active: &[String]) -> Vec<String> {
        self.missing.retain(|id| !active.contains(id));

        let absent: Vec<String> = self
            .pending
            .iter()
            .filter(|id| !active.contains(id))
            .cloned()
            .collect();

        let mut stopped = Vec::new();
        for id in absent {
            if self.missing.remove(&id) {
                self.pending.remove(&id);
                self.summary.stopped += 1;
                stopped.push(id);
            } else {
                self.missing.insert(id);
            }
        }

        stopped.sort();
        stopped
    }

    pub fn interrupt(&mut self) {
        self.summary.interrupted = true;
        self.pending.clear();
        self.missing.clear();
    }

    pub fn summary(&self) -> &FollowSummary {
        &self.summary
    }
}

/// Wait until every session has an outcome, stops being tracked, or Ctrl-C
/// is pressed (which shuts the registry down).
pub async fn follow(
    registry: &AnalysisJobRegistry,
    events: &mut UnboundedReceiver<TrackerEvent>,
    sessions: Vec<String>,
    check_every: Duration,
) -> FollowSummary {
    let mut state = FollowState::new(sessions);
    let mut check = tokio::time::interval(check_every);

    while !state.is_done() {
        tokio::select! {
            Some(event) = events.recv() => {
                state.record(&event);
            }
            _ = check.tick() => {
                let active = registry.active_sessions().await;
                while let Ok(event) = events.try_recv() {
                    state.record(&event);
                }
                for id in state.check_active(&active) {
                    warn!("⏹️ Tracking of {} stopped without an outcome", id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping all tracking");
                registry.shutdown().await;
                state.interrupt();
            }
        }
    }

    state.summary().clone()
}
