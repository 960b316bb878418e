//! Request correlation and failure logging for the product API.

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_FORWARDED_ID_LEN: usize = 128;
const PRODUCT_ROUTE: &str = "/products/{id}";

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// Reuse a caller-supplied `x-request-id` when it is printable and short,
    /// otherwise mint a fresh one.
    fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = headers
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty() && value.len() <= MAX_FORWARDED_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { request_id }
    }
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_headers(request.headers());
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Request facts captured before the handler consumes the request.
struct RequestSummary {
    method: String,
    path: String,
    route: Option<String>,
    product_id: Option<i64>,
    request_id: String,
}

impl RequestSummary {
    fn capture(request: &Request<Body>) -> Self {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string());
        let path = request.uri().path().to_string();
        let product_id = product_id_from(route.as_deref(), &path);
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id.clone())
            .unwrap_or_default();

        Self {
            method: request.method().to_string(),
            path,
            route,
            product_id,
            request_id,
        }
    }
}

/// Product id addressed by a `/products/{id}` request, if it parses.
fn product_id_from(route: Option<&str>, path: &str) -> Option<i64> {
    if route != Some(PRODUCT_ROUTE) {
        return None;
    }
    path.rsplit('/').next()?.parse().ok()
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let summary = RequestSummary::capture(&request);
    let started = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");
    let route = summary.route.as_deref().unwrap_or("unmatched");
    let elapsed_ms = started.elapsed().as_millis() as u64;

    macro_rules! failure {
        ($level:ident, $message:literal) => {
            $level!(
                target = "vitrine::http::response",
                status = status.as_u16(),
                method = %summary.method,
                route,
                path = %summary.path,
                product_id = summary.product_id,
                elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = %summary.request_id,
                $message,
            )
        };
    }

    if status.is_server_error() {
        failure!(error, "request failed");
    } else {
        failure!(warn, "client request error");
    }

    response
}
