//! Client-side tracking of server-side analysis jobs
//!
//! [`AnalysisJob`] is a pure state machine fed one progress response per tick.
//! The [`registry`](crate::registry) owns jobs, drives them from a
//! [`Scheduler`] and reports outcomes to an [`AnalysisObserver`].

pub mod job;
pub mod messages;
pub mod observer;
pub mod scheduler;

pub use job::{AnalysisJob, JobState, Transition};
pub use messages::normalize_error;
pub use observer::{
    AnalysisObserver, ChannelObserver, LoggingObserver, NoopObserver, ObserverSet, TrackerEvent,
};
pub use scheduler::{ManualScheduler, Scheduler, Ticker, TokioScheduler};
