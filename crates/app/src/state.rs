use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use common::prelude::*;
use common::resolver::DEFAULT_LOOKUP_URL;
use common::session::SessionError;
use common::transport::TransportError;

pub const APP_NAME: &str = "hubkit";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SESSION_FILE_NAME: &str = "session.json";

pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin this client signs in as; scopes the app bucket
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
    /// Name lookup service used to find other users' buckets
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    /// Per-request timeout against hubs and the lookup service
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_app_origin() -> String {
    DEFAULT_APP_ORIGIN.to_string()
}

fn default_lookup_url() -> String {
    DEFAULT_LOOKUP_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_origin: default_app_origin(),
            lookup_url: default_lookup_url(),
            timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Configured level, or `warn` if it does not parse
    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::WARN)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the hubkit directory (~/.hubkit)
    pub hubkit_dir: PathBuf,
    /// Path to the persisted session
    pub session_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the hubkit directory path (custom or default ~/.hubkit)
    pub fn hubkit_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new hubkit state directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let hubkit_dir = Self::hubkit_dir(custom_path)?;

        if hubkit_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&hubkit_dir)?;

        let config_path = hubkit_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            session_path: hubkit_dir.join(SESSION_FILE_NAME),
            hubkit_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the hubkit directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let hubkit_dir = Self::hubkit_dir(custom_path)?;

        if !hubkit_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = hubkit_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            session_path: hubkit_dir.join(SESSION_FILE_NAME),
            hubkit_dir,
            config_path,
            config,
        })
    }

    /// Restore the session and wire up everything that talks to the network
    pub fn client(&self) -> Result<HubClient, StateError> {
        let transport = ReqwestTransport::new(Some(Duration::from_secs(self.config.timeout_secs)))?;
        let cancel = transport.cancel_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling in-flight requests");
                cancel.cancel();
            }
        });
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let store = Arc::new(FileSessionStore::new(&self.session_path));
        let session = Arc::new(Session::restore(store)?);

        let resolver = HttpNameResolver::new(&self.config.lookup_url, transport.clone());
        let storage = Storage::new(session.clone(), transport.clone())
            .with_resolver(Arc::new(resolver))
            .with_app_origin(self.config.app_origin.clone());

        Ok(HubClient {
            config: self.config.clone(),
            verifier: AuthVerifier::new(transport.clone()),
            transport,
            session,
            storage,
        })
    }
}

/// Everything an operation needs to talk to the user's hub
pub struct HubClient {
    pub config: AppConfig,
    pub transport: Arc<dyn Transport>,
    pub session: Arc<Session>,
    pub verifier: AuthVerifier,
    pub storage: Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("hubkit directory not initialized. Run 'hubkit init' first")]
    NotInitialized,

    #[error("hubkit directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
