use std::fmt;

use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::crypto::{Address, PublicKey};
use crate::hub::HubConfig;

pub const DID_BTC_ADDR_PREFIX: &str = "did:btc-addr:";

pub const DEFAULT_HUB_URL: &str = "https://hub.blockstack.org";

/// Claims carried by an auth response token.
///
/// Only ever built from a payload whose signature has already been checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthTokenPayload {
    pub iss: String,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub public_keys: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
    #[serde(default)]
    pub profile_url: Option<String>,
    /// Hex of a serialized cipher envelope, or plaintext in the unencrypted flow
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub core_token: Option<String>,
    #[serde(default, rename = "hubUrl")]
    pub hub_url: Option<String>,
    #[serde(default, rename = "associationToken")]
    pub association_token: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl AuthTokenPayload {
    /// The key the token claims to be signed with
    pub fn issuer_key(&self) -> Result<PublicKey, AuthError> {
        let hex = self
            .public_keys
            .first()
            .ok_or(AuthError::MissingClaim("public_keys"))?;
        PublicKey::from_hex(hex)
            .map_err(|e| AuthError::MalformedToken(format!("public_keys[0]: {}", e)))
    }

    pub fn issuer_address(&self) -> Result<Address, AuthError> {
        address_from_did(&self.iss)
    }
}

pub fn address_from_did(did: &str) -> Result<Address, AuthError> {
    let address = did.strip_prefix(DID_BTC_ADDR_PREFIX).ok_or_else(|| {
        AuthError::MalformedToken(format!("unsupported decentralized id: {}", did))
    })?;
    address
        .parse()
        .map_err(|e| AuthError::MalformedToken(format!("iss: {}", e)))
}

pub fn did_from_address(address: &Address) -> String {
    format!("{}{}", DID_BTC_ADDR_PREFIX, address)
}

/// The durable result of a sign-in
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile: serde_json::Value,
    pub decentralized_id: String,
    pub identity_address: String,
    /// Hex, as delivered by the identity provider
    pub app_private_key: Option<String>,
    pub core_session_token: Option<String>,
    pub auth_response_token: String,
    pub hub_url: String,
    pub association_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_config: Option<HubConfig>,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("username", &self.username)
            .field("decentralized_id", &self.decentralized_id)
            .field("hub_url", &self.hub_url)
            .field("has_app_private_key", &self.app_private_key.is_some())
            .field("hub_config", &self.hub_config.as_ref().map(|c| &c.server))
            .finish_non_exhaustive()
    }
}
