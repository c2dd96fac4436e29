//! HTTP boundary shared by the network analyzers.
//!
//! Adapters describe a request with [`HttpRequest`] and hand it to a
//! [`Transport`]. Status codes are turned into [`ServiceError`] in exactly one
//! place, [`HttpResponse::error_for_status`], so adapters only ever match on
//! the closed error enum.

mod client;
mod encode;

pub use client::ReqwestTransport;
pub use encode::{quote, quote_plus};

use async_trait::async_trait;
use serde_json::Value;

/// Longest vendor message kept in an error.
const MAX_ERROR_BODY: usize = 256;

/// Failure at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Resource not found")]
    NotFound,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("HTTP Error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Unreachable, timed out or rate limited
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Map a non-success status code. Returns `None` for 2xx.
    pub fn from_status(status: u16, body: &[u8]) -> Option<Self> {
        if (200..300).contains(&status) {
            return None;
        }
        let message = vendor_message(status, body);
        Some(match status {
            401 | 403 => Self::NotAuthorized,
            404 => Self::NotFound,
            429 | 503 | 509 => Self::Unavailable(message),
            400..=499 => Self::BadRequest(message),
            _ => Self::ServerError { status, message },
        })
    }
}

fn vendor_message(status: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("status {}", status);
    }
    text.chars().take(MAX_ERROR_BODY).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// File attached to a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
}

/// Description of one outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Body::Form(fields);
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn multipart(mut self, fields: Vec<(String, String)>, file: FilePart) -> Self {
        self.body = Body::Multipart { fields, file };
        self
    }

    /// Value of a query parameter, if set.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a header, if set.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw answer of the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, ServiceError> {
        serde_json::from_slice(&self.body).map_err(|e| ServiceError::Malformed(e.to_string()))
    }

    pub fn error_for_status(self) -> Result<Self, ServiceError> {
        match ServiceError::from_status(self.status, &self.body) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// One HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request. Any status code counts as a completed exchange;
    /// only connection-level failures are errors here.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ServiceError>;

    /// Perform the request and map non-2xx statuses to [`ServiceError`].
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ServiceError> {
        log::debug!("{:?} {}", request.method, request.url);
        self.send(request).await?.error_for_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceError::from_status(200, b"{}"), None);
        assert_eq!(ServiceError::from_status(204, b""), None);
        assert_eq!(ServiceError::from_status(404, b"nope"), Some(ServiceError::NotFound));
        assert_eq!(ServiceError::from_status(403, b""), Some(ServiceError::NotAuthorized));
        assert_eq!(ServiceError::from_status(401, b""), Some(ServiceError::NotAuthorized));
        assert!(matches!(ServiceError::from_status(400, b"bad"), Some(ServiceError::BadRequest(m)) if m == "bad"));
        assert!(matches!(ServiceError::from_status(429, b""), Some(ServiceError::Unavailable(_))));
        assert!(matches!(ServiceError::from_status(503, b""), Some(ServiceError::Unavailable(_))));
        assert!(matches!(
            ServiceError::from_status(500, b" boom "),
            Some(ServiceError::ServerError { status: 500, message }) if message == "boom"
        ));
    }

    #[test]
    fn test_empty_body_message_names_status() {
        let err = ServiceError::from_status(502, b"").unwrap();
        assert_eq!(err.to_string(), "HTTP Error 502: status 502");
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://example.test/api")
            .query("limit", "10")
            .header("X-Api-Key", "secret")
            .json(json!({ "a": 1 }));
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.header_value("x-api-key"), Some("secret"));
        assert_eq!(request.body, Body::Json(json!({ "a": 1 })));
    }

    #[test]
    fn test_response_json_malformed() {
        let response = HttpResponse::new(200, "not json");
        assert!(matches!(response.json(), Err(ServiceError::Malformed(_))));
    }
}
