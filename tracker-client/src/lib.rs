//! Deployment tracker client.
//!
//! Reports a single usage event per process to a remote collection endpoint
//! and keeps the outcome around for a status page.

pub mod client;
pub mod config;
pub mod delivery;
pub mod descriptor;
pub mod history;
pub mod metrics_defs;
pub mod request;
pub mod status_service;
pub mod transport;

#[cfg(test)]
mod testutils;

pub use client::Tracker;
pub use delivery::{DeliveryError, DeliveryTracker, Submission};
pub use descriptor::{ConfigError, Descriptors, Overrides};
pub use history::HistoryStore;
pub use request::{RequestBuilder, TrackingKey, TrackingRequest};
pub use transport::{HttpTransport, Transport, TransportError};

/// Name reported on the status page.
pub const TRACKER_NAME: &str = env!("CARGO_PKG_NAME");

/// Client version reported on the status page.
pub const TRACKER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the client's source code can be found, `None` if not published.
pub fn tracker_source_url() -> Option<&'static str> {
    Some(env!("CARGO_PKG_REPOSITORY")).filter(|url| !url.is_empty())
}
