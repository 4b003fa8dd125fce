//! Session lifecycle
//!
//! ```text
//! Unauthenticated --sign in--> Authenticated{key} --connect--> Connected{key, hub}
//!        ^                                                          |
//!        +-------------------------- sign out ----------------------+
//! ```
//!
//! The hub config is only ever replaced whole. Every transition is written
//! through to the [`SessionStore`] while the state lock is held, so the
//! persisted blob never lags behind a newer in-memory state.

mod store;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::auth::{AuthError, AuthVerifier, UserData};
use crate::crypto::{KeyError, SecretKey};
use crate::hub::{self, HubConfig, HubError};
use crate::transport::Transport;

pub use store::{
    FileSessionStore, MemorySessionStore, SessionData, SessionStore, SESSION_DATA_VERSION,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("no sign-in in progress")]
    NoPendingSignIn,
    #[error("auth response did not include an app private key")]
    MissingAppKey,
    /// The user changed while a hub connect was in flight
    #[error("session changed during hub connect")]
    SessionChanged,
    #[error("unsupported session data version {0}")]
    UnsupportedVersion(u32),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("hub error: {0}")]
    Hub(#[from] HubError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        key: SecretKey,
        user: Arc<UserData>,
    },
    Connected {
        key: SecretKey,
        user: Arc<UserData>,
        hub: Arc<HubConfig>,
    },
}

impl SessionState {
    fn signed_in(user: UserData) -> Result<Self, SessionError> {
        let key = user
            .app_private_key
            .as_deref()
            .ok_or(SessionError::MissingAppKey)?;
        let key = SecretKey::from_hex(key)?;
        let hub = user.hub_config.clone().map(Arc::new);
        let user = Arc::new(user);

        Ok(match hub {
            Some(hub) => SessionState::Connected { key, user, hub },
            None => SessionState::Authenticated { key, user },
        })
    }

    pub fn key(&self) -> Option<&SecretKey> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { key, .. } | SessionState::Connected { key, .. } => {
                Some(key)
            }
        }
    }

    pub fn user(&self) -> Option<&Arc<UserData>> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { user, .. } | SessionState::Connected { user, .. } => {
                Some(user)
            }
        }
    }

    pub fn hub(&self) -> Option<&Arc<HubConfig>> {
        match self {
            SessionState::Connected { hub, .. } => Some(hub),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    transit_key: Option<SecretKey>,
}

#[derive(Debug)]
pub struct Session {
    inner: RwLock<SessionInner>,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// A fresh, signed-out session. Nothing is read from `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: RwLock::new(SessionInner {
                state: SessionState::Unauthenticated,
                transit_key: None,
            }),
            store,
        }
    }

    /// Rebuild the session persisted in `store`
    pub fn restore(store: Arc<dyn SessionStore>) -> Result<Self, SessionError> {
        let data = store.load()?.unwrap_or_default();

        let state = match data.user_data {
            Some(user) => SessionState::signed_in(user)?,
            None => SessionState::Unauthenticated,
        };
        let transit_key = data
            .transit_key
            .as_deref()
            .map(SecretKey::from_hex)
            .transpose()?;

        Ok(Self {
            inner: RwLock::new(SessionInner { state, transit_key }),
            store,
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.read().state.key().is_some()
    }

    pub fn user_data(&self) -> Option<Arc<UserData>> {
        self.inner.read().state.user().cloned()
    }

    pub fn app_key(&self) -> Result<SecretKey, SessionError> {
        self.inner
            .read()
            .state
            .key()
            .cloned()
            .ok_or(SessionError::NotSignedIn)
    }

    pub fn hub_config(&self) -> Option<Arc<HubConfig>> {
        self.inner.read().state.hub().cloned()
    }

    /// Generate and remember the transit key for a new sign-in.
    ///
    /// Any previous pending sign-in is abandoned.
    pub fn begin_sign_in(&self) -> Result<SecretKey, SessionError> {
        let key = SecretKey::generate()?;
        let mut inner = self.inner.write();
        inner.transit_key = Some(key.clone());
        self.persist(&inner)?;
        Ok(key)
    }

    pub fn transit_key(&self) -> Option<SecretKey> {
        self.inner.read().transit_key.clone()
    }

    /// Finish a sign-in started with [`Session::begin_sign_in`]
    pub async fn handle_pending_sign_in(
        &self,
        verifier: &AuthVerifier,
        auth_response: &str,
    ) -> Result<Arc<UserData>, SessionError> {
        let transit_key = self
            .transit_key()
            .ok_or(SessionError::NoPendingSignIn)?;
        let user = verifier
            .verify_and_decode(auth_response, &transit_key)
            .await?;
        self.complete_sign_in(user)
    }

    /// Sign in with an auth response whose secrets are not encrypted
    pub async fn handle_unencrypted_sign_in(
        &self,
        verifier: &AuthVerifier,
        auth_response: &str,
    ) -> Result<Arc<UserData>, SessionError> {
        let user = verifier.verify_unencrypted(auth_response).await?;
        self.complete_sign_in(user)
    }

    fn complete_sign_in(&self, user: UserData) -> Result<Arc<UserData>, SessionError> {
        let state = SessionState::signed_in(user)?;
        let user = state.user().cloned().ok_or(SessionError::NotSignedIn)?;

        let mut inner = self.inner.write();
        inner.state = state;
        inner.transit_key = None;
        self.persist(&inner)?;

        tracing::info!("signed in as {}", user.decentralized_id);
        Ok(user)
    }

    /// Swap in a new hub config for the signed-in user
    pub fn set_hub_config(&self, hub: HubConfig) -> Result<Arc<HubConfig>, SessionError> {
        self.install_hub_config(None, hub)
    }

    /// With `expected`, installs only while that key is still the signed-in
    /// one. The check and the swap share one write lock.
    fn install_hub_config(
        &self,
        expected: Option<&SecretKey>,
        hub: HubConfig,
    ) -> Result<Arc<HubConfig>, SessionError> {
        let hub = Arc::new(hub);
        let mut inner = self.inner.write();
        if let Some(expected) = expected {
            if inner.state.key() != Some(expected) {
                return Err(SessionError::SessionChanged);
            }
        }
        inner.state = match &inner.state {
            SessionState::Unauthenticated => return Err(SessionError::NotSignedIn),
            SessionState::Authenticated { key, user } | SessionState::Connected { key, user, .. } => {
                SessionState::Connected {
                    key: key.clone(),
                    user: user.clone(),
                    hub: hub.clone(),
                }
            }
        };
        self.persist(&inner)?;
        Ok(hub)
    }

    /// Negotiate a fresh hub config and install it.
    ///
    /// Concurrent connects are allowed; the last one to finish wins.
    pub async fn connect(&self, transport: &dyn Transport) -> Result<Arc<HubConfig>, SessionError> {
        let (key, user) = {
            let inner = self.inner.read();
            match &inner.state {
                SessionState::Unauthenticated => return Err(SessionError::NotSignedIn),
                SessionState::Authenticated { key, user }
                | SessionState::Connected { key, user, .. } => (key.clone(), user.clone()),
            }
        };

        let config = hub::connect(
            transport,
            &user.hub_url,
            &key,
            user.association_token.as_deref(),
        )
        .await?;

        self.install_hub_config(Some(&key), config)
    }

    /// The cached hub config, connecting first if there is none
    pub async fn hub_config_or_connect(
        &self,
        transport: &dyn Transport,
    ) -> Result<Arc<HubConfig>, SessionError> {
        match self.hub_config() {
            Some(hub) => Ok(hub),
            None => self.connect(transport).await,
        }
    }

    /// Drop the key and hub config and delete the persisted session
    pub fn sign_user_out(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        inner.state = SessionState::Unauthenticated;
        inner.transit_key = None;
        self.store.delete()
    }

    fn persist(&self, inner: &SessionInner) -> Result<(), SessionError> {
        let user_data = inner.state.user().map(|user| {
            let mut user = UserData::clone(user);
            user.hub_config = inner.state.hub().map(|hub| HubConfig::clone(hub));
            user
        });

        self.store.save(&SessionData {
            version: store::SESSION_DATA_VERSION,
            transit_key: inner.transit_key.as_ref().map(SecretKey::to_hex),
            user_data,
        })
    }
}
