//! Backend API access for the Presentation Coach service
//!
//! The tracker only talks to the backend through [`AnalysisApi`], so tests can
//! swap the HTTP client for a scripted implementation.

use async_trait::async_trait;

use crate::config::ApiConfig;
use crate::Result;

pub mod client;
pub mod models;

pub use client::HttpAnalysisApi;
pub use models::{
    AnalysisStatus, AnalyzeResponse, DeleteResponse, ProgressResponse, SessionListResponse,
    SessionSummary,
};

/// Trait for the analysis backend
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// `POST /session/{id}/analyze`
    async fn start_analysis(&self, token: &str, session_id: &str) -> Result<AnalyzeResponse>;

    /// `GET /session/{id}/progress`
    async fn fetch_progress(&self, token: &str, session_id: &str) -> Result<ProgressResponse>;

    /// `GET /session/all`
    async fn list_sessions(&self, token: &str) -> Result<Vec<SessionSummary>>;

    /// `DELETE /session/{id}`
    async fn delete_session(&self, token: &str, session_id: &str) -> Result<DeleteResponse>;
}

/// Create the HTTP backend from configuration
pub fn create_api(config: &ApiConfig) -> Result<Box<dyn AnalysisApi>> {
    Ok(Box::new(HttpAnalysisApi::new(config.clone())?))
}
