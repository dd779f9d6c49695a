//! Request logging middleware
//!
//! One INFO span per request (method, path) and one event per response
//! (status, latency). Query strings are not recorded: decision links carry
//! the token there.

use axum::{body::Body, http::Request};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnResponse, MakeSpan, TraceLayer};
use tracing::{Level, Span};

/// Span factory that records the path without the query string
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOnlySpan;

impl MakeSpan<Body> for PathOnlySpan {
    fn make_span(&mut self, request: &Request<Body>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Create request logging middleware
pub fn logging_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, PathOnlySpan> {
    TraceLayer::new_for_http()
        .make_span_with(PathOnlySpan)
        .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
}
