use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the analysis tracker
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Poll cadence and ceiling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Where the bearer token comes from
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Presentation Coach backend
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status fetches in milliseconds
    pub interval_ms: u64,

    /// Give up on a job after this many seconds of polling (0 = never)
    pub max_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Explicit bearer token
    pub token: Option<String>,

    /// Environment variable holding the token
    pub token_env: Option<String>,

    /// File holding the token, re-read on every request
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            max_duration_seconds: 20 * 60,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        match self.max_duration_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, falling back to the environment
    pub fn load() -> Result<Self> {
        let config_paths = [
            "coach-tracker.toml",
            "config/coach-tracker.toml",
            "/etc/coach-tracker/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path, e))?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path);
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("COACH_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(interval) = std::env::var("COACH_POLL_INTERVAL_MS") {
            self.polling.interval_ms = interval.parse().unwrap_or(self.polling.interval_ms);
        }

        if let Ok(max) = std::env::var("COACH_POLL_MAX_SECONDS") {
            self.polling.max_duration_seconds =
                max.parse().unwrap_or(self.polling.max_duration_seconds);
        }

        if let Ok(path) = std::env::var("COACH_TOKEN_FILE") {
            self.auth.token_file = Some(PathBuf::from(path));
        }

        if let Ok(log_level) = std::env::var("COACH_LOG_LEVEL") {
            self.output.log_level = log_level;
        }

        if self.auth.token_env.is_none() {
            self.auth.token_env = Some("COACH_TOKEN".to_string());
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(anyhow!("polling.interval_ms must be greater than 0"));
        }

        if self.api.request_timeout_seconds == 0 {
            return Err(anyhow!("api.request_timeout_seconds must be greater than 0"));
        }

        let url = url::Url::parse(&self.api.base_url)
            .map_err(|e| anyhow!("api.base_url is not a valid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("api.base_url must use http or https"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Coach Tracker Configuration:\n\
            - Backend: {}\n\
            - Request Timeout: {}s\n\
            - Poll Interval: {}ms\n\
            - Poll Ceiling: {}\n\
            - Token File: {}",
            self.api.base_url,
            self.api.request_timeout_seconds,
            self.polling.interval_ms,
            match self.polling.max_duration() {
                Some(d) => format!("{}s", d.as_secs()),
                None => "none".to_string(),
            },
            self.auth
                .token_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_seconds = seconds;
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.polling.interval_ms = interval_ms;
        self
    }

    pub fn with_max_poll_seconds(mut self, seconds: u64) -> Self {
        self.config.polling.max_duration_seconds = seconds;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth.token = Some(token.into());
        self
    }

    pub fn with_token_file(mut self, path: PathBuf) -> Self {
        self.config.auth.token_file = Some(path);
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.output.log_level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
