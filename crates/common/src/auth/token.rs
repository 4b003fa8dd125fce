//! Compact ES256K tokens
//!
//! `base64url(header) "." base64url(payload) "." base64url(r || s)`, the
//! signature being ECDSA over SHA-256 of the first two segments.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::crypto::{PublicKey, SecretKey, Signature};

pub const ES256K: &str = "ES256K";

/// URL-safe alphabet, no padding on encode, padding tolerated on decode
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    pub alg: String,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            typ: Some("JWT".to_string()),
            alg: ES256K.to_string(),
        }
    }
}

/// A token split into its parts. Nothing in here is trusted until
/// [`DecodedToken::verify`] succeeds.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: TokenHeader,
    pub payload: serde_json::Value,
    signing_input: String,
    signature: Vec<u8>,
}

pub fn decode_token(token: &str) -> Result<DecodedToken, AuthError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let header = decode_segment(segments[0], "header")?;
    let payload = decode_segment(segments[1], "payload")?;
    let signature = TOKEN_ENGINE
        .decode(segments[2])
        .map_err(|e| AuthError::MalformedToken(format!("signature: {}", e)))?;

    Ok(DecodedToken {
        header,
        payload,
        signing_input: format!("{}.{}", segments[0], segments[1]),
        signature,
    })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, AuthError> {
    let bytes = TOKEN_ENGINE
        .decode(segment)
        .map_err(|e| AuthError::MalformedToken(format!("{}: {}", name, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(format!("{}: {}", name, e)))
}

impl DecodedToken {
    pub fn verify(&self, key: &PublicKey) -> Result<(), AuthError> {
        if self.header.alg != ES256K {
            return Err(AuthError::UnsupportedAlgorithm(self.header.alg.clone()));
        }
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| AuthError::InvalidSignature)?;
        key.verify(self.signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidSignature)
    }

    /// Deserialize the payload into a typed claim set
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| AuthError::MalformedToken(format!("claims: {}", e)))
    }
}

pub struct TokenSigner<'a> {
    key: &'a SecretKey,
}

impl<'a> TokenSigner<'a> {
    pub fn new(key: &'a SecretKey) -> Self {
        Self { key }
    }

    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String, AuthError> {
        let header = TOKEN_ENGINE.encode(serde_json::to_vec(&TokenHeader::default())?);
        let payload = TOKEN_ENGINE.encode(serde_json::to_vec(payload)?);
        let signing_input = format!("{}.{}", header, payload);
        let signature = self.key.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            TOKEN_ENGINE.encode(signature.to_bytes())
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_and_verify() {
        let key = SecretKey::generate().unwrap();
        let token = TokenSigner::new(&key)
            .sign(&json!({"iss": "someone", "n": 1}))
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = decode_token(&token).unwrap();
        assert_eq!(decoded.header.alg, ES256K);
        assert_eq!(decoded.payload["n"], 1);
        decoded.verify(&key.public()).unwrap();
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SecretKey::generate().unwrap();
        let other = SecretKey::generate().unwrap();
        let token = TokenSigner::new(&key).sign(&json!({"a": "b"})).unwrap();
        let decoded = decode_token(&token).unwrap();
        assert!(matches!(
            decoded.verify(&other.public()),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_segment_count() {
        for token in ["", "a.b", "a.b.c.d"] {
            assert!(matches!(
                decode_token(token),
                Err(AuthError::MalformedToken(_))
            ));
        }
    }

    #[test]
    fn test_undecodable_payload() {
        let header = TOKEN_ENGINE.encode(br#"{"alg":"ES256K"}"#);
        let token = format!("{}.%%%.AAAA", header);
        assert!(matches!(
            decode_token(&token),
            Err(AuthError::MalformedToken(_))
        ));

        let not_json = TOKEN_ENGINE.encode(b"not json");
        let token = format!("{}.{}.AAAA", header, not_json);
        assert!(matches!(
            decode_token(&token),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = SecretKey::generate().unwrap();
        let token = TokenSigner::new(&key)
            .sign(&json!({"username": "alice.id"}))
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = TOKEN_ENGINE.encode(br#"{"username":"mallory.id"}"#);
        let forged = format!("{}.{}.{}", parts[0], forged, parts[2]);

        let decoded = decode_token(&forged).unwrap();
        assert!(matches!(
            decoded.verify(&key.public()),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rejects_other_algorithms() {
        let key = SecretKey::generate().unwrap();
        let header = TOKEN_ENGINE.encode(br#"{"typ":"JWT","alg":"none"}"#);
        let payload = TOKEN_ENGINE.encode(b"{}");
        let decoded = decode_token(&format!("{}.{}.", header, payload)).unwrap();
        assert!(matches!(
            decoded.verify(&key.public()),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }
}
