use crate::client::Tracker;
use crate::request::TrackingRequest;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response};
use shared::admin_service::AdminService;
use shared::http::{make_html_response, run_http_service};
use std::fmt::Write;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum StatusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

type ReadyFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Serves the tracker status page plus the health and readiness probes.
pub struct StatusService {
    tracker: Arc<Tracker>,
    status_path: String,
    admin: AdminService<ReadyFn, StatusError>,
}

impl StatusService {
    pub fn new(tracker: Arc<Tracker>, status_path: impl Into<String>) -> Self {
        let ready_tracker = tracker.clone();
        let is_ready: ReadyFn = Box::new(move || ready_tracker.has_attempted());

        StatusService {
            tracker,
            status_path: status_path.into(),
            admin: AdminService::new(is_ready),
        }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<BoxBody<Bytes, StatusError>> {
        if method == Method::GET && path == self.status_path {
            let page = render_status_page(
                crate::TRACKER_NAME,
                self.tracker.version(),
                self.tracker.source_url(),
                &self.tracker.list_requests(),
            );
            return make_html_response(page);
        }
        self.admin.respond(method, path)
    }
}

impl Service<Request<Incoming>> for StatusService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = StatusError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = self.respond(req.method(), req.uri().path());
        Box::pin(async move { Ok(res) })
    }
}

pub async fn serve(
    host: &str,
    port: u16,
    tracker: Arc<Tracker>,
    status_path: &str,
) -> Result<(), StatusError> {
    let service = StatusService::new(tracker, status_path);
    run_http_service(host, port, service).await
}

/// Scheme, host and non-default port of the tracking URL.
fn destination(tracking_url: &str) -> String {
    match Url::parse(tracking_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            }
        }
        Err(_) => tracking_url.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_status_page(
    name: &str,
    version: &str,
    source_url: Option<&str>,
    requests: &[TrackingRequest],
) -> String {
    let mut page = String::new();
    let source = match source_url {
        Some(url) => format!(
            r#"<a href="{0}" target="_blank">{0}</a>"#,
            escape(url)
        ),
        None => "not published".to_string(),
    };

    // Writing into a String cannot fail.
    let _ = write!(
        page,
        concat!(
            "<html><head><title>Deployment tracker client</title></head><body>\n",
            "<div class=\"container\">\n<h2>Tracker information</h2>\n",
            "<table class=\"table-condensed\">\n",
            "<tr><th>Tracker name</th><td>{}</td></tr>\n",
            "<tr><th>Tracker version</th><td>{}</td></tr>\n",
            "<tr><th>Tracker source code URL</th><td>{}</td></tr>\n",
            "</table>\n</div>\n",
            "<div class=\"container\">\n<h2>Tracking information</h2>\n",
            "<table class=\"table-condensed\">\n",
        ),
        escape(name),
        escape(version),
        source,
    );

    for request in requests {
        let _ = write!(
            page,
            concat!(
                "<tr><th>Tracker instance URL</th><td><a href=\"{}\" target=\"_blank\">{}</a></td></tr>\n",
                "<tr><th>Application name</th><td>{}</td></tr>\n",
                "<tr><th>Application id</th><td>{}</td></tr>\n",
                "<tr><th>Application instance index</th><td>{}</td></tr>\n",
                "<tr><th>Application version</th><td>{}</td></tr>\n",
                "<tr><th>Tracking date</th><td>{}</td></tr>\n",
                "<tr><th>Tracking status</th><td>{}</td></tr>\n",
            ),
            escape(&destination(request.tracking_url())),
            escape(request.tracking_url()),
            escape(request.application_name()),
            escape(request.application_id().unwrap_or("-")),
            request
                .instance_index()
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string()),
            escape(request.application_version()),
            escape(request.request_date()),
            request.request_status(),
        );
    }

    page.push_str("</table>\n</div>\n</body></html>\n");
    page
}
