//! The HTTP response envelope.

use claimledger_gateway::LedgerError;
use serde_json::{Value, json};

use crate::routes::RouteError;

/// Response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Sent as `application/json`.
    Json(Value),
    /// Sent as `text/html; charset=utf-8`, like a plain `send`.
    Text(String),
}

/// Status and body of a route's response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Payload.
    pub body: ResponseBody,
}

impl ApiResponse {
    /// `200` with a JSON body.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self { status: 200, body: ResponseBody::Json(body) }
    }

    /// `200` with a text body.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self { status: 200, body: ResponseBody::Text(body.into()) }
    }

    /// `status` with `{"error": message}`.
    #[must_use]
    pub fn error(status: u16, message: impl AsRef<str>) -> Self {
        Self { status, body: ResponseBody::Json(json!({ "error": message.as_ref() })) }
    }

    /// The liveness probe response.
    #[must_use]
    pub fn health() -> Self {
        Self::json(json!({ "status": "OK", "message": "Server is running" }))
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Content-Type` header value.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self.body {
            ResponseBody::Json(_) => "application/json; charset=utf-8",
            ResponseBody::Text(_) => "text/html; charset=utf-8",
        }
    }

    /// Serialized body.
    #[must_use]
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            ResponseBody::Json(v) => v.to_string().into_bytes(),
            ResponseBody::Text(s) => s.clone().into_bytes(),
        }
    }

    /// The `error` field of a JSON error body.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Json(v) => v.get("error").and_then(Value::as_str),
            ResponseBody::Text(_) => None,
        }
    }
}

/// Every classified ledger failure is a `500`.
impl From<&LedgerError> for ApiResponse {
    fn from(err: &LedgerError) -> Self {
        Self::error(500, err.message())
    }
}

impl From<&RouteError> for ApiResponse {
    fn from(err: &RouteError) -> Self {
        Self::error(err.status(), err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use claimledger_gateway::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::identity(ErrorKind::IdentityNotFound)]
    #[case::validation(ErrorKind::ValidationFailed)]
    #[case::connectivity(ErrorKind::ConnectivityLost)]
    #[case::upstream(ErrorKind::UpstreamFailure)]
    fn every_ledger_error_is_500(#[case] kind: ErrorKind) {
        let response = ApiResponse::from(&LedgerError::new(kind, "boom"));
        assert_eq!(response.status, 500);
        assert_eq!(response.body, ResponseBody::Json(json!({"error": "boom"})));
    }

    #[test]
    fn health_body() {
        let response = ApiResponse::health();
        assert!(response.is_success());
        let body: Value = serde_json::from_slice(&response.body_bytes()).unwrap();
        assert_eq!(body, json!({"status": "OK", "message": "Server is running"}));
    }

    #[test]
    fn text_bodies_are_not_json() {
        let response = ApiResponse::text("Policy POL1 defined successfully.");
        assert_eq!(response.content_type(), "text/html; charset=utf-8");
        assert_eq!(response.body_bytes(), b"Policy POL1 defined successfully.");
        assert!(response.error_message().is_none());
    }
}
