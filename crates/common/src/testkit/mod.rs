//! In-process doubles for exercising the client without a network
//!
//! - [`MemoryHub`]: a hub that keeps files in memory and checks bearer
//!   tokens like a real one.
//! - [`ScriptedTransport`]: canned responses in order, for protocol tests.
//! - [`AuthResponseBuilder`]: mints auth response tokens.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::prelude::*;
//! use common::testkit::{signed_in_session, MemoryHub};
//!
//! #[tokio::test]
//! async fn test_roundtrip() -> anyhow::Result<()> {
//!     let hub = MemoryHub::new();
//!     let identity = SecretKey::generate()?;
//!     let app_key = SecretKey::generate()?;
//!     let session = signed_in_session(&identity, &app_key, &hub).await?;
//!     let storage = Storage::new(session, Arc::new(hub.clone()));
//!
//!     storage.put_file("a.txt", "hi", &PutFileOptions::default()).await?;
//!     let content = storage.get_file("a.txt", &GetFileOptions::default()).await?;
//!     assert_eq!(content.as_text(), Some("hi"));
//!     Ok(())
//! }
//! ```
mod auth;
mod hub;
mod scripted;

use std::sync::Arc;

pub use auth::AuthResponseBuilder;
pub use hub::{MemoryHub, CHALLENGE, HUB_SERVER, READ_PREFIX};
pub use scripted::ScriptedTransport;

use crate::auth::AuthVerifier;
use crate::crypto::SecretKey;
use crate::session::{MemorySessionStore, Session, SessionError};

/// A session signed in through an unencrypted auth response whose hub is
/// `hub`. Not connected yet.
pub async fn signed_in_session(
    identity: &SecretKey,
    app_key: &SecretKey,
    hub: &MemoryHub,
) -> Result<Arc<Session>, SessionError> {
    let token = AuthResponseBuilder::new(identity)
        .app_key(app_key)
        .hub_url(HUB_SERVER)
        .build()?;

    let session = Session::new(Arc::new(MemorySessionStore::new()));
    session
        .handle_unencrypted_sign_in(&AuthVerifier::new(Arc::new(hub.clone())), &token)
        .await?;
    Ok(Arc::new(session))
}
