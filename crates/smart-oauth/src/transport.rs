//! HTTP transport collaborator.
//!
//! The protocol code never talks to the network directly; it goes through an
//! injected [`HttpTransport`]. [`ReqwestTransport`] is the production
//! implementation, [`StaticTransport`] serves scripted responses and records
//! what was sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Default timeout for a single request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header name/value pairs sent with a request.
pub type Headers = Vec<(String, String)>;

/// Raw response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 response with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into a [`TransportError::Status`].
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Failure reported by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout, TLS or other request-level failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request(_) => None,
        }
    }

    /// Response body for status failures, the message otherwise.
    pub fn body(&self) -> &str {
        match self {
            TransportError::Status { body, .. } => body,
            TransportError::Request(message) => message,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}

/// Synchronous request/response collaborator.
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Issue a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;

    /// Issue a POST request with an already-encoded body.
    fn post(
        &self,
        url: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn HttpTransport>;

// ============================================================================
// ReqwestTransport
// ============================================================================

/// Blocking reqwest-backed transport.
///
/// Non-2xx responses are reported as [`TransportError::Status`] carrying the
/// response body.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(format!("smart-oauth/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing blocking client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }

    fn finish(response: reqwest::blocking::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text()?;
        HttpResponse::new(status, body).error_for_status()
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        Self::finish(response)
    }

    fn post(
        &self,
        url: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("invalid header value: {}", e)))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(url)
            .headers(header_map)
            .body(body.to_string())
            .send()?;
        Self::finish(response)
    }
}

// ============================================================================
// StaticTransport (for testing)
// ============================================================================

/// HTTP method of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request captured by [`StaticTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Headers,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded form fields of the body, in order.
    pub fn form(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn form_value(&self, key: &str) -> Option<String> {
        self.form().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// In-memory transport replaying queued responses in FIFO order.
#[derive(Debug, Default)]
pub struct StaticTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response; non-2xx statuses are surfaced as errors.
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(response.error_for_status());
        self
    }

    pub fn push_json(&self, value: serde_json::Value) -> &Self {
        self.push_response(HttpResponse::json(&value))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next(&self, request: RecordedRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(TransportError::Request(format!(
                "no scripted response for {}",
                url
            )))
        })
    }
}

impl HttpTransport for StaticTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: Method::Get,
            url: url.to_string(),
            body: None,
            headers: Vec::new(),
        })
    }

    fn post(
        &self,
        url: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.next(RecordedRequest {
            method: Method::Post,
            url: url.to_string(),
            body: Some(body.to_string()),
            headers: headers.to_vec(),
        })
    }
}
