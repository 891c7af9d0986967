/// Presentation Coach analysis tracker
///
/// Starts server-side video analysis for recorded practice sessions and follows
/// each job by polling its progress until it completes, fails or is cancelled.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod follow;
pub mod registry;
pub mod tracker;

// Re-export main types for easy access
pub use crate::api::{AnalysisApi, AnalysisStatus, HttpAnalysisApi, SessionSummary};
pub use crate::config::Config;
pub use crate::credentials::CredentialProvider;
pub use crate::error::{Result, TrackerError};
pub use crate::follow::{follow, FollowSummary};
pub use crate::registry::{AnalysisJobRegistry, RegistryBuilder, RegistryStats, StartOutcome};
pub use crate::tracker::{AnalysisJob, AnalysisObserver, JobState, TrackerEvent};
