//! Shared test utilities for storage integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::SecretKey;
use common::storage::Storage;
use common::testkit::{signed_in_session, MemoryHub};

pub struct TestEnv {
    pub hub: MemoryHub,
    pub identity: SecretKey,
    pub app_key: SecretKey,
    pub storage: Storage,
}

impl TestEnv {
    /// Bucket address of the signed-in app key
    pub fn address(&self) -> String {
        self.app_key.public().address().to_string()
    }
}

/// Set up a signed-in user against a fresh in-memory hub
pub async fn setup_test_env() -> TestEnv {
    setup_with_hub(MemoryHub::new()).await
}

/// Log to the test writer; `RUST_LOG=common=debug` shows protocol steps
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn setup_with_hub(hub: MemoryHub) -> TestEnv {
    init_tracing();
    let identity = SecretKey::generate().unwrap();
    let app_key = SecretKey::generate().unwrap();
    let session = signed_in_session(&identity, &app_key, &hub).await.unwrap();
    let storage = Storage::new(session, Arc::new(hub.clone()));

    TestEnv {
        hub,
        identity,
        app_key,
        storage,
    }
}
