//! Bearer credential providers
//!
//! The tracker never acquires or refreshes credentials itself. It asks a
//! [`CredentialProvider`] on every request and stops as soon as none is
//! available.

use std::path::PathBuf;
use tracing::debug;

use crate::config::AuthConfig;

/// Source of the bearer token attached to backend requests
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn none() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        non_empty(self.token.clone())
    }
}

/// Token read from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredential {
    fn bearer_token(&self) -> Option<String> {
        non_empty(std::env::var(&self.var).ok())
    }
}

/// Token read from a file on every request, so a login elsewhere is picked up
#[derive(Debug, Clone)]
pub struct FileCredential {
    path: PathBuf,
}

impl FileCredential {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialProvider for FileCredential {
    fn bearer_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => non_empty(Some(content)),
            Err(e) => {
                debug!("Token file {} unreadable: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Tries each provider in order
pub struct ChainedCredential {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainedCredential {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl CredentialProvider for ChainedCredential {
    fn bearer_token(&self) -> Option<String> {
        self.providers.iter().find_map(|p| p.bearer_token())
    }
}

/// Build the provider chain described by configuration: explicit token, then env var, then file
pub fn from_config(auth: &AuthConfig) -> ChainedCredential {
    let mut providers: Vec<Box<dyn CredentialProvider>> = Vec::new();

    if let Some(token) = &auth.token {
        providers.push(Box::new(StaticCredential::new(token.clone())));
    }
    if let Some(var) = &auth.token_env {
        providers.push(Box::new(EnvCredential::new(var.clone())));
    }
    if let Some(path) = &auth.token_file {
        providers.push(Box::new(FileCredential::new(path.clone())));
    }

    ChainedCredential::new(providers)
}

fn non_empty(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
