use crate::config::Config;
use crate::delivery::{DeliveryError, DeliveryTracker, Submission};
use crate::descriptor::{ConfigError, Descriptors, Overrides};
use crate::history::HistoryStore;
use crate::metrics_defs::BUILD_FAILURES;
use crate::request::{RequestBuilder, TrackingRequest};
use crate::transport::{HttpTransport, Transport, TransportError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Entry point for host applications. Every `track*` call is best effort:
/// failures are logged here and never returned to the caller.
pub struct Tracker {
    builder: RequestBuilder,
    delivery: DeliveryTracker,
    override_file: Option<PathBuf>,
    source_url: Option<String>,
    attempted: AtomicBool,
}

impl Tracker {
    pub fn new(config: &Config, store: Arc<HistoryStore>) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, store, Arc::new(transport)))
    }

    pub fn with_transport(
        config: &Config,
        store: Arc<HistoryStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Tracker {
            builder: RequestBuilder::new(config.default_tracking_url.clone()),
            delivery: DeliveryTracker::new(store, transport),
            override_file: config.override_file.clone(),
            source_url: config
                .source_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .or_else(|| crate::tracker_source_url())
                .map(str::to_owned),
            attempted: AtomicBool::new(false),
        }
    }

    /// Tracks this deployment using the descriptors from the environment.
    pub async fn track(&self) -> Option<Submission> {
        self.track_with_url(None).await
    }

    /// Like [`Tracker::track`], sending to `custom_url` when it is non-empty.
    pub async fn track_with_url(&self, custom_url: Option<&str>) -> Option<Submission> {
        self.track_descriptors(Descriptors::from_env(), custom_url)
            .await
    }

    pub async fn track_descriptors(
        &self,
        descriptors: Descriptors,
        custom_url: Option<&str>,
    ) -> Option<Submission> {
        let outcome = self.try_track(descriptors, custom_url).await;
        self.attempted.store(true, Ordering::Release);
        outcome
    }

    async fn try_track(
        &self,
        descriptors: Descriptors,
        custom_url: Option<&str>,
    ) -> Option<Submission> {
        let request = match self.build_request(&descriptors, custom_url) {
            Ok(request) => request,
            Err(ConfigError::Absent) => {
                shared::counter!(BUILD_FAILURES, "kind" => "absent").increment(1);
                tracing::info!("VCAP_APPLICATION is not set, deployment tracking skipped");
                return None;
            }
            Err(e) => {
                shared::counter!(BUILD_FAILURES, "kind" => e.kind()).increment(1);
                tracing::warn!(error = %e, "could not collect tracking information");
                return None;
            }
        };

        let application = request.application_name();
        match self.delivery.submit(&request).await {
            Ok(Submission::Sent(status)) => {
                tracing::info!(
                    application,
                    status,
                    url = request.tracking_url(),
                    "tracking request delivered"
                );
                Some(Submission::Sent(status))
            }
            Ok(Submission::Duplicate) => {
                tracing::debug!(
                    application,
                    key = %request.tracking_key(),
                    "deployment already tracked"
                );
                Some(Submission::Duplicate)
            }
            Err(DeliveryError::Rejected { status, body }) => {
                let payload = serde_json::to_string(request.payload()).unwrap_or_default();
                tracing::warn!(
                    application,
                    status,
                    payload = %payload,
                    response = body.as_deref().unwrap_or_default(),
                    "tracking request rejected"
                );
                None
            }
            Err(DeliveryError::Transport(e)) => {
                tracing::warn!(
                    application,
                    error = %e,
                    "an error occurred while trying to track application"
                );
                None
            }
        }
    }

    fn build_request(
        &self,
        descriptors: &Descriptors,
        custom_url: Option<&str>,
    ) -> Result<TrackingRequest, ConfigError> {
        let file_overrides = self.load_override_file();
        let env_overrides = descriptors
            .overrides
            .as_deref()
            .map(Overrides::from_json)
            .transpose()?
            .unwrap_or_default();

        let mut overrides = file_overrides.merge(env_overrides);
        if let Some(url) = custom_url.filter(|url| !url.trim().is_empty()) {
            overrides.custom_tracker_url = Some(url.to_string());
        }

        self.builder
            .build(descriptors.application.as_deref(), &overrides)
    }

    // An unusable packaged file never prevents tracking.
    fn load_override_file(&self) -> Overrides {
        let Some(path) = &self.override_file else {
            return Overrides::default();
        };

        match Overrides::from_yaml_file(path) {
            Ok(overrides) => overrides.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring override file");
                Overrides::default()
            }
        }
    }

    /// All tracking attempts made through this tracker's store.
    pub fn list_requests(&self) -> Vec<TrackingRequest> {
        self.delivery.list_requests()
    }

    /// Whether a tracking attempt has completed, successful or not.
    pub fn has_attempted(&self) -> bool {
        self.attempted.load(Ordering::Acquire)
    }

    pub fn version(&self) -> &'static str {
        crate::TRACKER_VERSION
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }
}
