//! HTTP-like request execution
//!
//! Everything that talks to a hub, a profile host or a name lookup service
//! goes through [`Transport`]. The library never retries on its own; timeouts
//! and cancellation belong to the transport implementation.

mod http_client;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

pub use http_client::{CancelHandle, ReqwestTransport};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request was aborted through a [`CancelHandle`]
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid header value for {0}")]
    InvalidHeader(String),
    #[error("failed to encode request body: {0}")]
    Body(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether the same request may succeed if issued again.
    ///
    /// Hub-reported failures are never transport errors, they arrive as a
    /// response with a non-2xx status.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Cancelled | TransportError::Timeout | TransportError::Io(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, TransportError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn bearer(self, token: &str) -> Result<Self, TransportError> {
        self.header(AUTHORIZATION, &format!("bearer {}", token))
    }

    pub fn content_type(self, content_type: &str) -> Result<Self, TransportError> {
        self.header(CONTENT_TYPE, content_type)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_vec(value)?;
        Ok(self.content_type("application/json")?.body(body))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self
    }

    pub fn json_body<T: Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, body).with_content_type("application/json")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text for error reporting
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
