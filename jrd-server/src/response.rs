//! Response encoder
//!
//! Turns a [`Dispatched`] request into what the HTTP layer sends back:
//! a status code, headers and an optional JSON body. `None` as body means
//! the request was a notification that gets no answer; the transport
//! replies `204 No Content`.
//!
//! | outcome                                  | status            | body                      |
//! |------------------------------------------|-------------------|---------------------------|
//! | call succeeded                           | `reply.status`    | `{"result": .., "id": ..}`|
//! | call failed                              | from the error    | `{"error": .., "id": ..}` |
//! | notification succeeded                   | 204               | none                      |
//! | notification failed before invocation    | from the error*   | `{"error": .., "id": null}` |
//! | notification failed in the procedure     | 204               | none                      |
//!
//! \* only with `echo_notification_errors`; otherwise 204.
//!
//! A reply whose status code or headers HTTP cannot carry becomes a
//! `-32603` error body with status 500, still echoing the id.

use crate::dispatcher::{DispatchOutcome, Dispatched, DispatcherConfig};
use crate::handler::Reply;
use jrd_core::{codec, Error, Id, JsonRpcResponse};
use warp::http::header::{HeaderName, HeaderValue};
use warp::http::StatusCode;

/// Content type of every JSON-RPC body
pub const CONTENT_TYPE_JSON: &str = "application/json";

const ENCODE_FAILURE_BODY: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Failed to encode response"},"id":null}"#;

/// Transport-level reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in send order
    pub headers: Vec<(String, String)>,
    /// JSON body; `None` for "no content"
    pub body: Option<String>,
}

impl HttpReply {
    /// `204 No Content`
    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A JSON body with the given status
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string())],
            body: Some(body),
        }
    }

    /// Look a header up, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when no body is sent
    pub fn is_no_content(&self) -> bool {
        self.body.is_none()
    }
}

/// Encode a dispatched request
pub fn encode(dispatched: Dispatched, config: &DispatcherConfig) -> HttpReply {
    let Dispatched {
        id,
        notification,
        outcome,
    } = dispatched;

    if notification {
        return match outcome {
            DispatchOutcome::Failure { error, stage }
                if stage.is_pre_invocation() && config.echo_notification_errors =>
            {
                encode_error(&error, None)
            }
            _ => HttpReply::no_content(),
        };
    }

    match outcome {
        DispatchOutcome::Success(reply) => {
            if let Err(e) = check_transport(&reply) {
                tracing::error!(error = %e, "Procedure reply cannot be sent over HTTP");
                return encode_error(&e, id);
            }
            let body = match codec::encode_response(&JsonRpcResponse::success(reply.value, id)) {
                Ok(body) => body,
                Err(e) => return encode_failure(&e),
            };
            let mut extra: Vec<(String, String)> = reply.headers.into_iter().collect();
            extra.sort();

            let mut http = HttpReply::json(reply.status, body);
            if extra.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-type")) {
                http.headers.clear();
            }
            http.headers.extend(extra);
            http
        }
        DispatchOutcome::Failure { error, .. } => encode_error(&error, id),
    }
}

/// Encode an error response echoing `id`
pub fn encode_error(error: &Error, id: Option<Id>) -> HttpReply {
    let response = JsonRpcResponse::error(error.to_error_data(), id);
    match codec::encode_response(&response) {
        Ok(body) => HttpReply::json(error.http_status(), body),
        Err(e) => encode_failure(&e),
    }
}

/// Reject status codes and headers the HTTP layer would refuse
fn check_transport(reply: &Reply) -> Result<(), Error> {
    StatusCode::from_u16(reply.status)
        .map_err(|_| Error::Internal(format!("invalid HTTP status code {}", reply.status)))?;
    for (name, value) in &reply.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Internal(format!("invalid HTTP header name '{}'", name)))?;
        HeaderValue::from_str(value)
            .map_err(|_| Error::Internal(format!("invalid value for HTTP header '{}'", name)))?;
    }
    Ok(())
}

fn encode_failure(error: &Error) -> HttpReply {
    tracing::error!(error = %error, "Failed to encode response");
    HttpReply::json(500, ENCODE_FAILURE_BODY.to_string())
}
