//! API data models

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis status vocabulary used by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnalysisStatus {
    #[default]
    NotStarted,
    Processing,
    Completed,
    CompletedWithWarning,
    Failed,
    /// Anything the backend sends that we do not recognise
    Other(String),
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AnalysisStatus::NotStarted => "not_started",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::CompletedWithWarning => "completed_with_warning",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Other(s) => s,
        }
    }
}

impl From<String> for AnalysisStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "not_started" => AnalysisStatus::NotStarted,
            "processing" => AnalysisStatus::Processing,
            "completed" => AnalysisStatus::Completed,
            "completed_with_warning" => AnalysisStatus::CompletedWithWarning,
            "failed" => AnalysisStatus::Failed,
            _ => AnalysisStatus::Other(value),
        }
    }
}

impl From<&str> for AnalysisStatus {
    fn from(value: &str) -> Self {
        AnalysisStatus::from(value.to_string())
    }
}

impl From<AnalysisStatus> for String {
    fn from(value: AnalysisStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /session/{id}/progress`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressResponse {
    /// Raw status string; kept unparsed because completion is detected by substring
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub progress: Option<f64>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    /// Legacy completion flag some backend versions send instead of a status
    #[serde(default)]
    pub completed: Option<bool>,
}

impl ProgressResponse {
    pub fn status_str(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    /// Error text, if the backend sent a non-empty one
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Reported progress clamped to 0..=100
    pub fn progress_percent(&self) -> u8 {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0)
    }

    pub fn processing(progress: f64, message: &str) -> Self {
        Self {
            status: Some("processing".to_string()),
            progress: Some(progress),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Body of `POST /session/{id}/analyze`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub already_completed: bool,

    #[serde(default)]
    pub in_progress: bool,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub video_too_short: bool,

    #[serde(default)]
    pub session_id: Option<String>,
}

impl AnalyzeResponse {
    pub fn started() -> Self {
        Self {
            success: true,
            message: Some("Analysis started successfully".to_string()),
            ..Default::default()
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// True when the backend refused to start the job
    pub fn is_rejection(&self) -> bool {
        !self.success
            || self.video_too_short
            || self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// One row of `GET /session/all`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub video_path: Option<String>,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub analysis_status: Option<AnalysisStatus>,

    #[serde(default)]
    pub analysis_error: Option<String>,

    #[serde(default)]
    pub analyzed_at: Option<String>,

    #[serde(default)]
    pub feedback: Option<serde_json::Value>,
}

impl SessionSummary {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            video_path: None,
            start_time: None,
            analysis_status: None,
            analysis_error: None,
            analyzed_at: None,
            feedback: None,
        }
    }

    pub fn with_status(mut self, status: AnalysisStatus) -> Self {
        self.analysis_status = Some(status);
        self
    }

    pub fn with_video(mut self, video_path: &str) -> Self {
        self.video_path = Some(video_path.to_string());
        self
    }

    pub fn with_start_time(mut self, start_time: &str) -> Self {
        self.start_time = Some(start_time.to_string());
        self
    }

    pub fn status(&self) -> AnalysisStatus {
        self.analysis_status.clone().unwrap_or_default()
    }

    pub fn has_video(&self) -> bool {
        self.video_path
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    pub fn is_analyzed(&self) -> bool {
        self.feedback.as_ref().is_some_and(|f| !f.is_null())
    }

    /// File name portion of the stored video path
    pub fn video_name(&self) -> Option<&str> {
        self.video_path
            .as_deref()
            .and_then(|p| p.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
    }

    /// Parsed start time; the backend emits RFC 3339 or naive ISO timestamps
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.start_time.as_deref()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Body of `GET /session/all`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionListResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

/// Body of `DELETE /session/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Error envelope returned by the backend on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Keep rows that carry a video, newest first
pub fn prepare_session_list(mut sessions: Vec<SessionSummary>) -> Vec<SessionSummary> {
    sessions.retain(SessionSummary::has_video);
    sessions.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_unknown() {
        let status: AnalysisStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, AnalysisStatus::Other("queued".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"queued\"");
    }

    #[test]
    fn test_progress_response_tolerates_missing_fields() {
        let resp: ProgressResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.status_str(), "unknown");
        assert_eq!(resp.progress_percent(), 0);
        assert!(resp.error_text().is_none());

        let resp: ProgressResponse =
            serde_json::from_str(r#"{"status":"processing","progress":140.2,"error":"  "}"#)
                .unwrap();
        assert_eq!(resp.progress_percent(), 100);
        assert!(resp.error_text().is_none());
    }

    #[test]
    fn test_analyze_response_short_video() {
        let resp: AnalyzeResponse = serde_json::from_str(
            r#"{"success":false,"error":"Video is too short. Minimum presentation length is 10 seconds.","video_too_short":true}"#,
        )
        .unwrap();
        assert!(resp.is_rejection());
        assert!(!AnalyzeResponse::started().is_rejection());
    }

    #[test]
    fn test_session_list_filter_and_order() {
        let json = r#"{"success":true,"sessions":[
            {"_id":"a","video_path":"a.mp4","start_time":"2024-03-01T10:00:00","analysis_status":"completed"},
            {"_id":"b","video_path":"","start_time":"2024-03-05T10:00:00"},
            {"_id":"c","video_path":"uploads/c.webm","start_time":"2024-03-03T10:00:00Z","analysis_status":"processing"}
        ]}"#;
        let list: SessionListResponse = serde_json::from_str(json).unwrap();
        let prepared = prepare_session_list(list.sessions);

        let ids: Vec<&str> = prepared.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(prepared[0].status(), AnalysisStatus::Processing);
        assert_eq!(prepared[0].video_name(), Some("c.webm"));
    }
}
