//! Request correlation ids.
//!
//! An id arriving from the edge proxy is kept when it is short printable
//! ASCII; anything else is replaced by a fresh UUID v4. The id is recorded on
//! the tracing span, tagged on the Sentry scope, stored in the request
//! extensions as [`RequestId`] and echoed in the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// Header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INBOUND_LEN: usize = 128;

/// The correlation id of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

fn accept_inbound(value: &str) -> Option<&str> {
    let sane = !value.is_empty()
        && value.len() <= MAX_INBOUND_LEN
        && value.bytes().all(|b| b.is_ascii_graphic());
    sane.then_some(value)
}

/// Assign every request a correlation id.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(accept_inbound)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", &request_id);
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Extension, Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route("/", get(|Extension(id): Extension<RequestId>| async move { id.0 }))
            .layer(middleware::from_fn(request_id_middleware))
    }

    async fn echoed(header: Option<&str>) -> String {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(REQUEST_ID_HEADER, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[test]
    fn test_accept_inbound() {
        assert_eq!(accept_inbound("cf-7a1b2c"), Some("cf-7a1b2c"));
        assert_eq!(accept_inbound(""), None);
        assert_eq!(accept_inbound("two words"), None);
        assert_eq!(accept_inbound(&"x".repeat(MAX_INBOUND_LEN + 1)), None);
    }

    #[tokio::test]
    async fn test_upstream_id_is_kept() {
        assert_eq!(echoed(Some("edge-42")).await, "edge-42");
    }

    #[tokio::test]
    async fn test_missing_or_oversized_id_is_generated() {
        let generated = echoed(None).await;
        assert!(Uuid::parse_str(&generated).is_ok());

        let replaced = echoed(Some(&"a".repeat(500))).await;
        assert!(Uuid::parse_str(&replaced).is_ok());
    }
}
