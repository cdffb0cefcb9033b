//! Request bookkeeping: a request id, a tracing span per request and a log
//! line for every failed response.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use metrics::histogram;
use tracing::{Instrument, Span, error, field, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::infra::telemetry::METRIC_HTTP_REQUEST_MS;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tag the request with a fresh id and echo it back in `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Run the request inside a `request` span and report 4xx/5xx responses.
///
/// The span carries an empty `user_id` field that session resolution fills in.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        user_id = field::Empty,
    );

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed = start.elapsed();
    histogram!(METRIC_HTTP_REQUEST_MS).record(elapsed.as_secs_f64() * 1000.0);

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = chain.first().map(String::as_str).unwrap_or("no diagnostic");

    span.in_scope(|| {
        if status.is_server_error() {
            error!(
                target: "yatube::http::response",
                status = status.as_u16(),
                query = %query,
                elapsed_ms = elapsed.as_millis(),
                source,
                detail,
                chain = ?chain,
                "request failed"
            );
        } else {
            warn!(
                target: "yatube::http::response",
                status = status.as_u16(),
                query = %query,
                elapsed_ms = elapsed.as_millis(),
                source,
                detail,
                "request rejected"
            );
        }
    });

    response
}

/// Attach the signed-in user to the current request span.
pub fn record_user(user_id: i64) {
    Span::current().record("user_id", user_id);
}
