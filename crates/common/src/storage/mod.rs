//! File transfer against the signed-in user's hub
//!
//! Writes build envelopes (encrypt first, then sign) and reads verify them
//! before anything is returned. Plaintext files can carry a detached
//! signature in a `<path>.sig` companion; that pair is written in two steps
//! and is not atomic.

mod error;
mod listing;
mod options;
mod read;
mod write;

use std::sync::Arc;

use http::StatusCode;

use crate::hub::HubConfig;
use crate::resolver::NameResolver;
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, Transport};

pub use error::{SignatureFailure, StorageError};
pub use listing::{FileListing, MAX_LIST_PAGES};
pub use options::{GetFileOptions, PutFileOptions};

pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Path of the detached signature companion of `path`
pub fn signature_path(path: &str) -> String {
    format!("{}{}", path, SIGNATURE_SUFFIX)
}

#[derive(Debug, Clone)]
pub struct Storage {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn NameResolver>>,
    app_origin: Option<String>,
}

impl Storage {
    pub fn new(session: Arc<Session>, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            resolver: None,
            app_origin: None,
        }
    }

    /// Needed to read other users' files
    pub fn with_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_app_origin(mut self, app_origin: impl Into<String>) -> Self {
        self.app_origin = Some(app_origin.into());
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    async fn hub(&self) -> Result<Arc<HubConfig>, StorageError> {
        Ok(self
            .session
            .hub_config_or_connect(self.transport.as_ref())
            .await?)
    }

    /// Send a request that carries the bearer token.
    ///
    /// A 401 means the token went stale: reconnect once and resend with the
    /// new config. Any other status is returned to the caller.
    async fn send_authorized<F>(&self, build: F) -> Result<HttpResponse, StorageError>
    where
        F: Fn(&HubConfig) -> Result<HttpRequest, StorageError> + Send + Sync,
    {
        let hub = self.hub().await?;
        let response = self.transport.execute(build(&hub)?).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("hub {} rejected our token, reconnecting", hub.server);
        let hub = self.session.connect(self.transport.as_ref()).await?;
        Ok(self.transport.execute(build(&hub)?).await?)
    }
}
