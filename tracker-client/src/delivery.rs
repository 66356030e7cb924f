use crate::history::HistoryStore;
use crate::metrics_defs::TRACKING_REQUESTS;
use crate::request::TrackingRequest;
use crate::transport::{Transport, TransportError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("tracking service responded with status {status}")]
    Rejected { status: u16, body: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The request was delivered and answered with a success status.
    Sent(u16),
    /// A request with the same key was already attempted by this tracker.
    Duplicate,
}

/// Enforces at-most-once delivery per tracking key.
#[derive(Clone)]
pub struct DeliveryTracker {
    store: Arc<HistoryStore>,
    transport: Arc<dyn Transport>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<HistoryStore>, transport: Arc<dyn Transport>) -> Self {
        DeliveryTracker { store, transport }
    }

    /// Attempts delivery unless the key was seen before. The entry is stored
    /// before the network call so concurrent submitters cannot both send, and
    /// the store lock is not held while waiting for the tracking service.
    pub async fn submit(&self, request: &TrackingRequest) -> Result<Submission, DeliveryError> {
        if !self.store.insert_if_absent(request) {
            shared::counter!(TRACKING_REQUESTS, "outcome" => "duplicate").increment(1);
            return Ok(Submission::Duplicate);
        }

        let response = match self
            .transport
            .send(request.tracking_url(), request.payload())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                shared::counter!(TRACKING_REQUESTS, "outcome" => "failed").increment(1);
                return Err(e.into());
            }
        };

        self.store
            .record_status(request.tracking_key(), response.status);

        if response.status >= 300 {
            shared::counter!(TRACKING_REQUESTS, "outcome" => "rejected").increment(1);
            return Err(DeliveryError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        shared::counter!(TRACKING_REQUESTS, "outcome" => "sent").increment(1);
        Ok(Submission::Sent(response.status))
    }

    /// Snapshot of every attempt made so far, in submission order.
    pub fn list_requests(&self) -> Vec<TrackingRequest> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }
}
