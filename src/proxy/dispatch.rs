//! One delivery of a broadcast request to one target.
//!
//! A [`Delivery`] is built per target by the coordinator and moved into its
//! own task. It resolves the destination URI and method, rebuilds headers,
//! replays the buffered body, and sends under its own timeout. The primary
//! hands back a response for the caller; secondaries drain and discard
//! theirs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use tokio_util::io::ReaderStream;

use super::completion::{DeliveryReport, DeliveryToken};
use super::headers::{apply_overrides, merge_headers, strip_hop_by_hop, strip_outbound_transport};
use crate::buffer::BufferHandle;
use crate::error::DeliveryError;
use crate::server::HttpClient;
use crate::target::Target;

/// The parts of the inbound request shared by every delivery.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

pub struct Delivery {
    pub request_id: Arc<str>,
    pub index: usize,
    pub target: Target,
    pub inbound: Arc<InboundRequest>,
    pub buffer: Arc<BufferHandle>,
    pub timeout: Duration,
    pub token: DeliveryToken,
}

impl Delivery {
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.index == 0
    }

    /// Execute the delivery. Returns the caller's response for the primary
    /// and `None` for secondaries.
    pub async fn run(self, client: HttpClient) -> Option<Response> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let result = self.send(&client).await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                let status = response.status();
                tracing::info!(
                    request_id = %self.request_id,
                    target = self.index,
                    primary = self.is_primary(),
                    status = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "target responded"
                );
                self.token.report(DeliveryReport {
                    index: self.index,
                    status: Some(status),
                    error: None,
                    elapsed,
                });

                if self.is_primary() {
                    let body_deadline = Deadline {
                        at: deadline,
                        timeout: self.timeout,
                    };
                    return Some(relay(response, self.token, body_deadline));
                }

                // Read to the end so the pooled connection can be reused
                let drained =
                    tokio::time::timeout_at(deadline, response.into_body().collect()).await;
                if !matches!(drained, Ok(Ok(_))) {
                    tracing::debug!(
                        request_id = %self.request_id,
                        target = self.index,
                        "secondary response body not fully read"
                    );
                }
                None
            }
            Err(error) => {
                if self.is_primary() {
                    tracing::error!(
                        request_id = %self.request_id,
                        target = self.index,
                        error = %error,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "primary target failed"
                    );
                } else {
                    tracing::warn!(
                        request_id = %self.request_id,
                        target = self.index,
                        error = %error,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "secondary target failed"
                    );
                }
                self.token.report(DeliveryReport {
                    index: self.index,
                    status: None,
                    error: Some(error.to_string()),
                    elapsed,
                });

                self.is_primary()
                    .then(|| (error.status(), error.public_message()).into_response())
            }
        }
    }

    async fn send(&self, client: &HttpClient) -> Result<hyper::Response<Incoming>, DeliveryError> {
        let body = self.replay_body().await?;
        let request = self.build_request(body)?;

        tracing::debug!(
            request_id = %self.request_id,
            target = self.index,
            method = %request.method(),
            uri = %request.uri(),
            "sending"
        );

        tokio::time::timeout(self.timeout, client.request(request))
            .await
            .map_err(|_| DeliveryError::Timeout(self.timeout))?
            .map_err(DeliveryError::from)
    }

    async fn replay_body(&self) -> Result<Body, DeliveryError> {
        if self.buffer.is_empty() {
            return Ok(Body::empty());
        }
        let file = self.buffer.open().await.map_err(DeliveryError::Open)?;
        let body = Body::from_stream(ReaderStream::new(file));
        Ok(self.token.clone().hold_until_dropped(body))
    }

    /// Build the outbound request for this target around `body`.
    pub fn build_request(&self, body: Body) -> Result<Request<Body>, DeliveryError> {
        let uri = resolve_uri(&self.target, &self.inbound.uri)?;
        let method = resolve_method(&self.target, &self.inbound.method)?;

        let mut request = Request::builder().method(method).uri(uri).body(body)?;

        let headers = request.headers_mut();
        merge_headers(headers, &self.inbound.headers);
        strip_outbound_transport(headers);
        if !self.buffer.is_empty() || self.inbound.headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(self.buffer.len()));
        }
        apply_overrides(headers, &self.target)?;

        Ok(request)
    }
}

/// Destination URI: the target's scheme and authority, a path that is
/// either the target's own (fixed-path mode) or the target's base path
/// followed by the inbound path, and the inbound query string verbatim.
pub fn resolve_uri(target: &Target, inbound: &Uri) -> Result<Uri, http::Error> {
    let path = if target.is_fixed_path() {
        target.base_path().to_string()
    } else {
        join_paths(target.base_path(), inbound.path())
    };
    let path = if path.is_empty() { "/" } else { path.as_str() };

    let mut uri = format!("{}://{}{path}", target.scheme(), target.authority());
    if let Some(query) = inbound.query() {
        uri.push('?');
        uri.push_str(query);
    }
    Ok(uri.parse::<Uri>()?)
}

pub fn resolve_method(target: &Target, inbound: &Method) -> Result<Method, http::Error> {
    match target.method_override() {
        Some(method) => Ok(Method::from_bytes(method.as_bytes())?),
        None => Ok(inbound.clone()),
    }
}

fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// End of a delivery's time budget, which also bounds the relayed body.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: tokio::time::Instant,
    timeout: Duration,
}

/// Turn the primary's response into the caller's response.
fn relay(
    response: hyper::Response<Incoming>,
    token: DeliveryToken,
    deadline: Deadline,
) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    let body = expire_at(Body::new(body), deadline);
    let mut relayed = Response::new(token.hold_until_dropped(body));
    *relayed.status_mut() = parts.status;
    merge_headers(relayed.headers_mut(), &parts.headers);
    relayed
}

/// Fail `body` with a timeout error once `deadline` passes, so a stalled
/// upstream cannot hold the delivery open.
fn expire_at(body: Body, deadline: Deadline) -> Body {
    let inner = Some(body.into_data_stream());
    let stream = futures_util::stream::unfold(inner, move |state| async move {
        let mut stream = state?;
        match tokio::time::timeout_at(deadline.at, stream.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(stream))),
            Ok(None) => None,
            Err(_) => {
                let err = DeliveryError::Timeout(deadline.timeout);
                Some((Err(axum::Error::new(err)), None))
            }
        }
    });
    Body::from_stream(stream)
}
