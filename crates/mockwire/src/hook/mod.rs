//! Reference interception hook: an HTTP server in front of an upstream.
//!
//! - `forward`: reqwest-based forwarding used for bypassed requests and for
//!   fetching original responses on demand
//!
//! Every incoming request is resolved by the [`Interceptor`]. Mocked
//! responses are written back directly, bypassed requests are forwarded to
//! the upstream, and the remaining outcomes map to error responses:
//!
//! - network error: `502` with `x-mockwire-network-error`
//! - unhandled in strict mode: `500` with `x-mockwire-unhandled` and a JSON body
//! - cancelled by shutdown: `503`

mod forward;

pub use forward::UpstreamNetwork;

use crate::error::ResolveError;
use crate::handler::{Network, OriginalSource};
use crate::pipeline::{Interceptor, Resolution};
use crate::request::{CanonicalRequest, RawRequest};
use crate::response::{HttpResponse, MockResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

pub const NETWORK_ERROR_HEADER: &str = "x-mockwire-network-error";
pub const UNHANDLED_HEADER: &str = "x-mockwire-unhandled";

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers that describe one connection rather than the message.
const HOP_BY_HOP: [HeaderName; 3] = [CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH];

/// HTTP server resolving every request through an [`Interceptor`].
pub struct MockwireServer {
    interceptor: Arc<Interceptor>,
    upstream: Option<Url>,
    network: Arc<UpstreamNetwork>,
    shutdown: CancellationToken,
}

impl MockwireServer {
    /// Without an upstream, only absolute-form request targets can be
    /// forwarded; everything else must be mocked.
    pub fn new(interceptor: Arc<Interceptor>, upstream: Option<Url>) -> anyhow::Result<Self> {
        Ok(Self {
            interceptor,
            upstream,
            network: Arc::new(UpstreamNetwork::new(UPSTREAM_TIMEOUT)?),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Stop accepting connections and cancel in-flight resolutions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accept connections until [`MockwireServer::shutdown`] is called.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        info!("Mockwire listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, _) = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Mockwire shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error: {}", e);
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return text_response(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let (url, forwardable) = self.target_url(&parts.uri, &parts.headers);
        let raw = RawRequest {
            method: parts.method.to_string(),
            url,
            headers: parts.headers,
            body,
        };

        let request = match CanonicalRequest::from_raw(raw).await {
            Ok(request) => Arc::new(request),
            Err(e) => {
                warn!("Rejecting request: {}", e);
                return text_response(StatusCode::BAD_REQUEST, &e.to_string());
            }
        };

        let original = if forwardable {
            let network: Arc<dyn Network> = self.network.clone();
            OriginalSource::Lazy(network)
        } else {
            OriginalSource::None
        };

        let resolution = self
            .interceptor
            .resolve_with_cancel(Arc::clone(&request), original, &self.shutdown)
            .await;

        match resolution {
            Ok(Resolution::Mocked { response, handler }) => {
                debug!("{} {} mocked by {}", request.method(), request.url(), handler);
                to_hyper_response(response)
            }
            // Already sent while resolving; never send it twice.
            Ok(Resolution::Bypass {
                original: Some(response),
            }) => to_hyper_response(response),
            Ok(Resolution::Bypass { original: None }) if forwardable => {
                match self.network.forward(&request).await {
                    Ok(response) => to_hyper_response(response),
                    Err(e) => {
                        error!("Failed to forward {} {}: {:#}", request.method(), request.url(), e);
                        network_error(&format!("{e:#}"))
                    }
                }
            }
            Ok(Resolution::Bypass { original: None }) => network_error("No upstream configured"),
            Ok(Resolution::NetworkError(message)) => network_error(&message),
            Ok(Resolution::Cancelled) => {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "Mockwire is shutting down")
            }
            Err(ResolveError::Unhandled { method, url }) => {
                let body = serde_json::json!({
                    "error": "unhandled request",
                    "method": method,
                    "url": url,
                });
                let response = MockResponse::json(&body)
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .header(UNHANDLED_HEADER, "true");
                to_hyper_response(response.into_response())
            }
            Err(e) => text_response(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    /// The URL an incoming request stands for, and whether it can reach the
    /// network.
    fn target_url(&self, uri: &hyper::Uri, headers: &hyper::HeaderMap) -> (String, bool) {
        let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        if uri.scheme().is_some() && uri.authority().is_some() {
            return (uri.to_string(), true);
        }
        if let Some(upstream) = &self.upstream {
            let base = upstream.as_str().trim_end_matches('/');
            return (format!("{base}{path_and_query}"), true);
        }
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        (format!("http://{host}{path_and_query}"), false)
    }
}

fn to_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body));
    *out.status_mut() = response.status;
    for (name, value) in response.headers.iter() {
        if !HOP_BY_HOP.contains(name) {
            out.headers_mut().append(name.clone(), value.clone());
        }
    }
    out
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = HttpResponse::new(status);
    response.body = Bytes::from(message.to_string());
    to_hyper_response(response)
}

fn network_error(message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    if let Ok(value) = hyper::header::HeaderValue::from_str(&message.replace(['\r', '\n'], " ")) {
        response.headers_mut().insert(NETWORK_ERROR_HEADER, value);
    }
    response
}
