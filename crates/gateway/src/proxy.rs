// Reverse proxy forwarder
// Decision: No retries here; retrying belongs to the client so writes are never duplicated
// Decision: Bodies are streamed both ways, never buffered or transcoded
// Decision: The timeout bounds time-to-response-headers only, so long downloads still stream
//
// The forwarder trusts that the caller already authorized the principal;
// it never re-checks entitlements.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes, HttpBody},
    http::{header, HeaderMap, HeaderName, Request, Response, Uri},
};
use futures::{SinkExt, StreamExt};
use otter_core::{ApiError, Principal, ServiceEntry, ServiceRegistry, USER_HEADER};

/// Forwards an authorized request to a backend and relays the response.
#[async_trait]
pub trait ReverseProxy: Send + Sync {
    /// `principal` is `None` only for public paths; the identity header is
    /// stripped either way and re-injected when a principal is given.
    async fn forward(
        &self,
        request: Request<Body>,
        upstream: &ServiceEntry,
        principal: Option<&Principal>,
    ) -> Result<Response<Body>, ApiError>;
}

/// reqwest-backed forwarder
pub struct HttpForwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            // Redirects are relayed to the caller, not followed
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ReverseProxy for HttpForwarder {
    async fn forward(
        &self,
        request: Request<Body>,
        upstream: &ServiceEntry,
        principal: Option<&Principal>,
    ) -> Result<Response<Body>, ApiError> {
        let (parts, body) = request.into_parts();
        let url = target_url(upstream, &parts.uri).ok_or(ApiError::UnknownService)?;

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(USER_HEADER);
        if let Some(principal) = principal {
            headers.insert(USER_HEADER, principal.to_header_value()?);
        }

        let mut builder = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers);
        // HTTP/2 frames the body itself, so length headers are not a reliable signal
        if !body.is_end_stream() {
            builder = builder.body(stream_body(body));
        }

        tracing::debug!(
            method = %parts.method,
            service = %upstream.name,
            target = %url,
            "Forwarding request"
        );

        let started = Instant::now();
        let upstream_response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Err(_) => {
                tracing::warn!(
                    service = %upstream.name,
                    target = %url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Upstream timed out"
                );
                return Err(ApiError::UpstreamTimeout);
            }
            Ok(Err(e)) => {
                tracing::warn!(service = %upstream.name, target = %url, error = %e, "Upstream unavailable");
                return Err(ApiError::UpstreamUnavailable);
            }
            Ok(Ok(response)) => response,
        };

        let status = upstream_response.status();
        tracing::debug!(
            service = %upstream.name,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        let mut response = Response::builder().status(status);
        if let Some(out) = response.headers_mut() {
            *out = strip_hop_by_hop(upstream_response.headers());
        }

        response
            .body(Body::from_stream(upstream_response.bytes_stream()))
            .map_err(|e| ApiError::Internal(e.into()))
    }
}

/// Build the upstream URL: base URL + path without the service prefix + original query
pub fn target_url(upstream: &ServiceEntry, uri: &Uri) -> Option<String> {
    let (_, rest) = ServiceRegistry::split_path(uri.path())?;
    let mut url = format!("{}{}", upstream.base_url(), rest);
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }
    Some(url)
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy headers, dropping hop-by-hop headers and any named in `Connection`
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || connection_listed.iter().any(|n| n == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// reqwest needs a `Sync` stream and axum bodies are not; pump through a channel.
/// The pump stops as soon as reqwest drops the receiving side.
fn stream_body(body: Body) -> reqwest::Body {
    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, axum::Error>>(8);
    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(rx)
}
