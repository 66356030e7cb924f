use crate::descriptor::{ApplicationDescriptor, ConfigError, Overrides};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Destination used when no custom tracker URL is configured.
pub const DEFAULT_TRACKING_URL: &str = "http://deployment-tracker.mybluemix.net/api/v1/track";

/// Status of a request that has not been answered by the tracking service.
pub const NOT_SENT: u16 = 0;

/// Deduplication key. Derived from the application name, version and space
/// id only, so rebuilding a request for the same deployment yields the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingKey(String);

impl TrackingKey {
    pub fn derive(application_name: &str, application_version: &str, space_id: &str) -> Self {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for field in [application_name, application_version, space_id] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        TrackingKey(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The JSON body posted to the tracking service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub application_name: String,
    pub application_version: String,
    pub application_uris: Vec<String>,
    pub space_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_version: Option<String>,
    #[serde(rename = "date_sent")]
    pub request_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingRequest {
    payload: Payload,
    tracking_url: String,
    tracking_key: TrackingKey,
    request_status: u16,
    application_id: Option<String>,
    instance_index: Option<u64>,
}

impl TrackingRequest {
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn tracking_url(&self) -> &str {
        &self.tracking_url
    }

    pub fn tracking_key(&self) -> &TrackingKey {
        &self.tracking_key
    }

    /// HTTP status returned by the tracking service, `NOT_SENT` until then.
    pub fn request_status(&self) -> u16 {
        self.request_status
    }

    pub fn application_name(&self) -> &str {
        &self.payload.application_name
    }

    pub fn application_version(&self) -> &str {
        &self.payload.application_version
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    pub fn instance_index(&self) -> Option<u64> {
        self.instance_index
    }

    pub fn request_date(&self) -> &str {
        &self.payload.request_date
    }

    pub(crate) fn set_request_status(&mut self, status: u16) {
        self.request_status = status;
    }
}

/// Assembles tracking requests from the raw descriptors.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    default_url: String,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        RequestBuilder::new(DEFAULT_TRACKING_URL)
    }
}

impl RequestBuilder {
    pub fn new(default_url: impl Into<String>) -> Self {
        RequestBuilder {
            default_url: default_url.into(),
        }
    }

    pub fn build(
        &self,
        application: Option<&str>,
        overrides: &Overrides,
    ) -> Result<TrackingRequest, ConfigError> {
        self.build_at(application, overrides, Utc::now())
    }

    pub fn build_at(
        &self,
        application: Option<&str>,
        overrides: &Overrides,
        now: DateTime<Utc>,
    ) -> Result<TrackingRequest, ConfigError> {
        let application = application.ok_or(ConfigError::Absent)?;
        let app = ApplicationDescriptor::from_json(application)?;

        let tracking_url = overrides
            .custom_tracker_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.default_url.as_str())
            .to_owned();

        let tracking_key =
            TrackingKey::derive(&app.application_name, &app.application_version, &app.space_id);

        let payload = Payload {
            application_name: app.application_name,
            application_version: app.application_version,
            application_uris: app.application_uris,
            space_id: app.space_id,
            repository_url: overrides.repository_url.clone(),
            code_version: overrides.code_version.clone(),
            request_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        Ok(TrackingRequest {
            payload,
            tracking_url,
            tracking_key,
            request_status: NOT_SENT,
            application_id: app.application_id,
            instance_index: app.instance_index,
        })
    }
}

/// Builds a request from the raw application and override descriptors using
/// the default tracking URL.
pub fn build(
    application: Option<&str>,
    overrides: Option<&str>,
) -> Result<TrackingRequest, ConfigError> {
    let overrides = overrides
        .map(Overrides::from_json)
        .transpose()?
        .unwrap_or_default();
    RequestBuilder::default().build(application, &overrides)
}
