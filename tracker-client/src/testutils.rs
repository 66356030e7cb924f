use crate::descriptor::Overrides;
use crate::request::{Payload, RequestBuilder, TrackingRequest};
use crate::transport::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

pub fn app_descriptor(name: &str, version: &str, space: &str) -> String {
    json!({
        "application_name": name,
        "application_version": version,
        "application_uris": [format!("{name}.example.com")],
        "space_id": space,
        "application_id": format!("{name}-guid"),
        "instance_index": 0,
    })
    .to_string()
}

pub fn request_for(name: &str, version: &str, space: &str) -> TrackingRequest {
    request_to(name, version, space, "http://127.0.0.1:9/api/v1/track")
}

pub fn request_to(name: &str, version: &str, space: &str, url: &str) -> TrackingRequest {
    let overrides = Overrides {
        custom_tracker_url: Some(url.to_string()),
        ..Default::default()
    };
    RequestBuilder::default()
        .build(Some(&app_descriptor(name, version, space)), &overrides)
        .expect("valid descriptor")
}

/// Transport double that counts calls and answers with a fixed result.
pub struct CountingTransport {
    calls: AtomicUsize,
    status: Option<u16>,
}

impl CountingTransport {
    pub fn responding(status: u16) -> Arc<Self> {
        Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            status: Some(status),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
            status: None,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(
        &self,
        url: &str,
        _payload: &Payload,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.status {
            Some(status) => Ok(TransportResponse {
                status,
                body: (status >= 300).then(|| "rejected".to_string()),
            }),
            None => Err(TransportError::Timeout(url.to_string())),
        }
    }
}

/// A request captured by [`TestTrackingServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

/// Local HTTP server standing in for the remote tracking service.
pub struct TestTrackingServer {
    pub port: u16,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl TestTrackingServer {
    pub async fn spawn(status: StatusCode, response_body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let captured_clone = captured.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let captured = captured_clone.clone();

                tokio::spawn(async move {
                    let handler = move |req: Request<Incoming>| {
                        let captured = captured.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let bytes = body
                                .collect()
                                .await
                                .map(|c| c.to_bytes())
                                .unwrap_or_else(|_| Bytes::new());

                            captured.lock().push(CapturedRequest {
                                method: parts.method.to_string(),
                                path: parts.uri.path().to_string(),
                                content_type: parts
                                    .headers
                                    .get(hyper::header::CONTENT_TYPE)
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_owned),
                                body: serde_json::from_slice(&bytes)
                                    .unwrap_or(serde_json::Value::Null),
                            });

                            let mut response =
                                Response::new(Full::new(Bytes::from_static(response_body.as_bytes())));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    };

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service_fn(handler))
                        .await;
                });
            }
        });

        TestTrackingServer { port, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().clone()
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
