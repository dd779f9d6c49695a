//! CORS middleware configuration
//!
//! The review UI polls approval status from the browser, possibly from
//! another origin. Only GET and POST with a JSON body are needed.

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create the CORS layer for the approval endpoints
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
