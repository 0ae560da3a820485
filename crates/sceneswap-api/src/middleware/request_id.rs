//! Request ID middleware for request correlation.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// HTTP header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attaches a request ID to the request and echoes it on the response.
///
/// An inbound `x-request-id` is preserved so upstream callers can
/// correlate; otherwise a fresh UUID is generated.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match HeaderValue::from_str(&id) {
        Ok(value) => {
            request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            let mut response = next.run(request).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
        // An unrepresentable inbound ID is dropped rather than rejected.
        Err(_) => next.run(request).await,
    }
}
