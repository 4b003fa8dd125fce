use serde::{Deserialize, Serialize};

use super::claims::did_from_address;
use super::token::TokenSigner;
use super::AuthError;
use crate::crypto::SecretKey;

pub const DEFAULT_SCOPES: &[&str] = &["store_write"];

const AUTH_REQUEST_VERSION: &str = "1.3.1";
const AUTH_REQUEST_LIFETIME_SECS: i64 = 60 * 60;

/// Sign-in request handed to an identity provider.
///
/// Identifies the app and carries the transit public key the provider will
/// encrypt the app private key to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub public_keys: Vec<String>,
    pub domain_name: String,
    pub manifest_uri: String,
    pub redirect_uri: String,
    pub version: String,
    pub do_not_include_profile: bool,
    pub supports_hub_url: bool,
    pub scopes: Vec<String>,
}

impl AuthRequest {
    pub fn new(transit_key: &SecretKey, app_origin: &str, scopes: &[&str]) -> Self {
        let origin = app_origin.trim_end_matches('/');
        let now = chrono::Utc::now().timestamp();
        let transit = transit_key.public();

        Self {
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + AUTH_REQUEST_LIFETIME_SECS,
            iss: did_from_address(&transit.address()),
            public_keys: vec![transit.to_hex()],
            domain_name: origin.to_string(),
            manifest_uri: format!("{}/manifest.json", origin),
            redirect_uri: format!("{}/", origin),
            version: AUTH_REQUEST_VERSION.to_string(),
            do_not_include_profile: true,
            supports_hub_url: true,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Encode as a token signed with the transit key
    pub fn sign(&self, transit_key: &SecretKey) -> Result<String, AuthError> {
        TokenSigner::new(transit_key).sign(self)
    }
}
