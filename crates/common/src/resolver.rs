use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use url::Url;

use crate::crypto::Address;
use crate::transport::{HttpRequest, Transport, TransportError};

pub const DEFAULT_LOOKUP_URL: &str = "https://core.blockstack.org";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("{username} has no bucket for app {app_origin}")]
    AppNotFound {
        username: String,
        app_origin: String,
    },
    #[error("name lookup failed with status {0}")]
    Lookup(StatusCode),
    #[error("malformed lookup response: {0}")]
    Malformed(String),
    #[error("bucket url has no valid address: {0}")]
    InvalidBucketUrl(String),
    #[error("invalid lookup url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Finds where another user publishes an app's files
#[async_trait]
pub trait NameResolver: Send + Sync + fmt::Debug {
    /// The public read URL of `username`'s bucket for `app_origin`
    async fn app_bucket_url(&self, username: &str, app_origin: &str)
        -> Result<String, ResolveError>;
}

/// Resolves names through a `/v1/users/<name>` lookup service
#[derive(Debug, Clone)]
pub struct HttpNameResolver {
    lookup_url: String,
    transport: Arc<dyn Transport>,
}

impl HttpNameResolver {
    pub fn new(lookup_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            lookup_url: lookup_url.trim_end_matches('/').to_string(),
            transport,
        }
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    async fn app_bucket_url(
        &self,
        username: &str,
        app_origin: &str,
    ) -> Result<String, ResolveError> {
        let url = Url::parse(&format!("{}/v1/users/{}", self.lookup_url, username))?;
        tracing::debug!("resolving {} via {}", username, url);

        let response = self.transport.execute(HttpRequest::get(url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(ResolveError::UserNotFound(username.to_string()));
        }
        if !response.is_success() {
            return Err(ResolveError::Lookup(response.status));
        }

        let record: Value = response
            .json()
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        let user = record
            .get(username)
            .ok_or_else(|| ResolveError::UserNotFound(username.to_string()))?;

        user.pointer("/profile/apps")
            .and_then(|apps| apps.get(app_origin))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ResolveError::AppNotFound {
                username: username.to_string(),
                app_origin: app_origin.to_string(),
            })
    }
}

/// The owner address is the last path segment of a bucket URL
pub fn bucket_address(bucket_url: &str) -> Result<Address, ResolveError> {
    bucket_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| ResolveError::InvalidBucketUrl(bucket_url.to_string()))
}
