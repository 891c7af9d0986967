use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::{
    AnalyzeResponse, DeleteResponse, ErrorBody, ProgressResponse, SessionListResponse,
    SessionSummary,
};
use super::AnalysisApi;
use crate::config::ApiConfig;
use crate::{Result, TrackerError};

/// reqwest-backed implementation of [`AnalysisApi`]
pub struct HttpAnalysisApi {
    base: Url,
    client: reqwest::Client,
}

impl HttpAnalysisApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url)?;
        // Url::join drops the last path segment unless the base ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    fn session_url(&self, session_id: &str, action: Option<&str>) -> Result<Url> {
        let mut path = format!("session/{}", urlencoding::encode(session_id));
        if let Some(action) = action {
            path.push('/');
            path.push_str(action);
        }
        Ok(self.base.join(&path)?)
    }

    /// Turn a non-2xx response into a `Status` error, preferring the backend's error text
    fn status_error(status: StatusCode, body: String) -> TrackerError {
        let body = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or(body);
        TrackerError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn start_analysis(&self, token: &str, session_id: &str) -> Result<AnalyzeResponse> {
        let url = self.session_url(session_id, Some("analyze"))?;
        debug!("Requesting analysis at {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        // 400 carries a structured refusal (e.g. video too short) rather than a transport problem
        if status == StatusCode::BAD_REQUEST {
            if let Ok(parsed) = serde_json::from_str::<AnalyzeResponse>(&body) {
                if parsed.error.is_some() || parsed.video_too_short {
                    return Ok(AnalyzeResponse {
                        success: false,
                        ..parsed
                    });
                }
            }
        }

        Err(Self::status_error(status, body))
    }

    async fn fetch_progress(&self, token: &str, session_id: &str) -> Result<ProgressResponse> {
        let url = self.session_url(session_id, Some("progress"))?;

        let response = self.client.get(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body));
        }

        Ok(response.json().await?)
    }

    async fn list_sessions(&self, token: &str) -> Result<Vec<SessionSummary>> {
        let url = self.base.join("session/all")?;
        debug!("Listing sessions at {}", url);

        let response = self.client.get(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body));
        }

        let list: SessionListResponse = response.json().await?;
        Ok(list.sessions)
    }

    async fn delete_session(&self, token: &str, session_id: &str) -> Result<DeleteResponse> {
        let url = self.session_url(session_id, None)?;
        debug!("Deleting session at {}", url);

        let response = self.client.delete(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, body));
        }

        Ok(response.json().await?)
    }
}
