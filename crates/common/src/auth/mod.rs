//! Sign-in token handling
//!
//! An identity provider answers an [`AuthRequest`] with a signed auth
//! response token. [`AuthVerifier`] checks that token against the issuer's
//! key before reading any claim, then decrypts the app private key and core
//! session token that were encrypted to the requester's transit key.

mod claims;
mod request;
mod token;
mod verifier;

pub use claims::{
    address_from_did, did_from_address, AuthTokenPayload, UserData, DEFAULT_HUB_URL,
    DID_BTC_ADDR_PREFIX,
};
pub use request::{AuthRequest, DEFAULT_SCOPES};
pub use token::{decode_token, DecodedToken, TokenHeader, TokenSigner, ES256K};
pub use verifier::{extract_profile_claim, verify_auth_response, AuthVerifier, CLOCK_SKEW_SECS};

use crate::crypto::CryptoError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The signature does not verify, or the signing key is not the issuer's
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
    #[error("failed to decrypt {claim}: {source}")]
    DecryptionFailed {
        claim: &'static str,
        source: CryptoError,
    },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("token encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
