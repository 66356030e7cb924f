use crate::request::DEFAULT_TRACKING_URL;
use crate::transport::DEFAULT_TIMEOUT;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_STATUS_PATH: &str = "/deployment-tracker";
pub const DEFAULT_OVERRIDE_FILE: &str = "META-INF/repository.yaml";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("timeout_ms cannot be 0")]
    InvalidTimeout,

    #[error("default_tracking_url is not a valid URL: {0}")]
    InvalidTrackingUrl(String),

    #[error("status_path must start with '/' and not shadow /health or /ready: {0}")]
    InvalidStatusPath(String),
}

/// Tracker configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connect and response timeout for the tracking request
    pub timeout_ms: u64,
    /// Destination used when no custom tracker URL is supplied
    pub default_tracking_url: String,
    /// Packaged YAML file with override fields. Missing files are ignored.
    pub override_file: Option<PathBuf>,
    /// Path the status page is served on
    pub status_path: String,
    /// Source code link shown on the status page. Falls back to the package
    /// `repository` field.
    pub source_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            default_tracking_url: DEFAULT_TRACKING_URL.into(),
            override_file: Some(DEFAULT_OVERRIDE_FILE.into()),
            status_path: DEFAULT_STATUS_PATH.into(),
            source_url: None,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        Url::parse(&self.default_tracking_url)
            .map_err(|_| ValidationError::InvalidTrackingUrl(self.default_tracking_url.clone()))?;

        if !self.status_path.starts_with('/')
            || matches!(self.status_path.as_str(), "/" | "/health" | "/ready")
        {
            return Err(ValidationError::InvalidStatusPath(self.status_path.clone()));
        }

        Ok(())
    }
}
