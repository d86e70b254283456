//! HTTP binding
//!
//! A `warp` filter that answers `POST <path>` by feeding the raw body to
//! [`Dispatcher::handle_body`] and turning the [`HttpReply`] into an HTTP
//! response. Other paths and methods are rejected so the filter composes
//! with the application's own routes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrd_server::{http, Dispatcher, MethodRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let dispatcher = Arc::new(Dispatcher::new(MethodRegistry::new()));
//! warp::serve(http::routes(dispatcher, "/api"))
//!     .run(([127, 0, 0, 1], 5000))
//!     .await;
//! # }
//! ```

use crate::dispatcher::Dispatcher;
use crate::response::{self, HttpReply, CONTENT_TYPE_JSON};
use jrd_core::Error;
use std::sync::Arc;
use warp::http::header::{HeaderValue, CONTENT_TYPE};
use warp::http::{Response, StatusCode};
use warp::hyper::body::{Body, Bytes};
use warp::path::FullPath;
use warp::Filter;

/// Default mount point of the JSON-RPC endpoint
pub const DEFAULT_PATH: &str = "/api";

/// Build the JSON-RPC endpoint filter
///
/// `path` is matched exactly; a missing leading `/` is added.
pub fn routes(
    dispatcher: Arc<Dispatcher>,
    path: impl Into<String>,
) -> impl Filter<Extract = (Response<Body>,), Error = warp::Rejection> + Clone {
    let path = Arc::new(normalize_path(path.into()));

    warp::post()
        .and(warp::path::full())
        .and(warp::body::bytes())
        .and_then(move |full: FullPath, body: Bytes| {
            let dispatcher = Arc::clone(&dispatcher);
            let path = Arc::clone(&path);
            async move {
                if full.as_str() != path.as_str() {
                    return Err(warp::reject::not_found());
                }
                let reply = dispatcher.handle_body(&body).await;
                Ok::<_, warp::Rejection>(into_response(reply))
            }
        })
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Convert an encoded reply into a warp response
///
/// [`response::encode`] only produces valid status codes and headers; a
/// hand-built [`HttpReply`] that is not valid still gets a JSON-RPC error
/// body.
pub fn into_response(reply: HttpReply) -> Response<Body> {
    let mut builder = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = reply.body.map(Body::from).unwrap_or_else(Body::empty);

    builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, status = reply.status, "Invalid HTTP reply");
        let fallback = response::encode_error(&Error::Internal(e.to_string()), None);
        let body = fallback.body.map(Body::from).unwrap_or_else(Body::empty);
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{from_fn, Procedure, Reply};
    use crate::registry::{MethodOptions, MethodRegistry};
    use serde_json::{json, Value};

    fn dispatcher() -> Arc<Dispatcher> {
        let mut registry = MethodRegistry::new();
        registry
            .register(
                "App.tagged",
                Procedure::without_params(from_fn(|_| async {
                    Ok(Reply::new(json!("tagged"))
                        .with_status(202)
                        .with_header("X-Tag", "JSONRPC"))
                })),
                MethodOptions::default(),
            )
            .unwrap();
        registry
            .register(
                "App.bad_header",
                Procedure::without_params(from_fn(|_| async {
                    Ok(Reply::new(Value::Null).with_header("Bad Header", "x"))
                })),
                MethodOptions::default(),
            )
            .unwrap();
        Arc::new(Dispatcher::new(registry))
    }

    #[tokio::test]
    async fn test_post_to_endpoint() {
        let filter = routes(dispatcher(), "/api");
        let response = warp::test::request()
            .method("POST")
            .path("/api")
            .body(r#"{"jsonrpc":"2.0","method":"App.tagged","id":"x"}"#)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 202);
        assert_eq!(response.headers()["X-Tag"], "JSONRPC");
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"jsonrpc": "2.0", "result": "tagged", "id": "x"}));
    }

    #[tokio::test]
    async fn test_notification_gets_no_content() {
        let filter = routes(dispatcher(), "api");
        let response = warp::test::request()
            .method("POST")
            .path("/api")
            .body(r#"{"jsonrpc":"2.0","method":"App.tagged"}"#)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 204);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_other_paths_and_methods_are_rejected() {
        let filter = routes(dispatcher(), "/api");

        let response = warp::test::request()
            .method("POST")
            .path("/other")
            .body("{}")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 404);

        let response = warp::test::request()
            .method("GET")
            .path("/api")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 405);
    }

    #[tokio::test]
    async fn test_invalid_header_gets_error_envelope() {
        let filter = routes(dispatcher(), "/api");
        let response = warp::test::request()
            .method("POST")
            .path("/api")
            .body(r#"{"jsonrpc":"2.0","method":"App.bad_header","id":1}"#)
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 500);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["id"], 1);
    }

    #[test]
    fn test_hand_built_invalid_reply_keeps_json_body() {
        let reply = HttpReply {
            status: 1000,
            headers: Vec::new(),
            body: None,
        };
        let response = into_response(reply);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], CONTENT_TYPE_JSON);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("api".into()), "/api");
        assert_eq!(normalize_path("/api".into()), "/api");
    }
}
