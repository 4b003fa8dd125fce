use std::sync::Arc;

use serde_json::Value;
use url::Url;

use super::claims::{AuthTokenPayload, UserData, DEFAULT_HUB_URL};
use super::token::decode_token;
use super::AuthError;
use crate::content::Content;
use crate::crypto::{Address, CipherEnvelope, PublicKey, SecretKey};
use crate::transport::{HttpRequest, Transport};

/// How far the local clock may disagree with the issuer's, applied to both
/// `exp` and `iat`
pub const CLOCK_SKEW_SECS: i64 = 300;

/// Decode an auth response token and check it was signed by its issuer.
///
/// The signing key is `public_keys[0]`; its address has to be the one named
/// by the `iss` DID. No claim is returned unless both hold.
pub fn verify_auth_response(token: &str) -> Result<(AuthTokenPayload, Address), AuthError> {
    let decoded = decode_token(token)?;
    let payload: AuthTokenPayload = decoded.claims()?;

    let identity = payload.issuer_address()?;
    let issuer_key = payload.issuer_key()?;
    if issuer_key.address() != identity {
        tracing::debug!(
            "auth response signed by {} but issued by {}",
            issuer_key.address(),
            identity
        );
        return Err(AuthError::InvalidSignature);
    }
    decoded.verify(&issuer_key)?;

    check_timestamps(&payload, chrono::Utc::now().timestamp())?;
    Ok((payload, identity))
}

fn check_timestamps(payload: &AuthTokenPayload, now: i64) -> Result<(), AuthError> {
    if let Some(exp) = payload.exp {
        if exp + CLOCK_SKEW_SECS < now {
            return Err(AuthError::TokenExpired);
        }
    }
    if let Some(iat) = payload.iat {
        if iat > now + CLOCK_SKEW_SECS {
            return Err(AuthError::IssuedInFuture);
        }
    }
    Ok(())
}

/// Return the `claim` of a signed profile token record, checked against
/// the key in its `issuer.publicKey`
pub fn extract_profile_claim(token: &str) -> Result<Value, AuthError> {
    let decoded = decode_token(token)?;
    let key = decoded
        .payload
        .pointer("/issuer/publicKey")
        .and_then(Value::as_str)
        .ok_or(AuthError::MissingClaim("issuer.publicKey"))?;
    let key = PublicKey::from_hex(key)
        .map_err(|e| AuthError::MalformedToken(format!("issuer.publicKey: {}", e)))?;
    decoded.verify(&key)?;

    decoded
        .payload
        .get("claim")
        .cloned()
        .ok_or(AuthError::MissingClaim("claim"))
}

#[derive(Debug, Clone)]
pub struct AuthVerifier {
    transport: Arc<dyn Transport>,
}

impl AuthVerifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Verify an auth response and decrypt the secrets it carries for
    /// `transit_key`
    pub async fn verify_and_decode(
        &self,
        token: &str,
        transit_key: &SecretKey,
    ) -> Result<UserData, AuthError> {
        let (payload, identity) = verify_auth_response(token)?;

        let app_private_key =
            decrypt_claim("private_key", payload.private_key.as_deref(), transit_key)?;
        let core_session_token =
            decrypt_claim("core_token", payload.core_token.as_deref(), transit_key)?;

        self.user_data(token, payload, identity, app_private_key, core_session_token)
            .await
    }

    /// Verify an auth response whose secrets are carried in plaintext
    pub async fn verify_unencrypted(&self, token: &str) -> Result<UserData, AuthError> {
        let (payload, identity) = verify_auth_response(token)?;

        let app_private_key = present(payload.private_key.as_deref()).map(str::to_string);
        let core_session_token = present(payload.core_token.as_deref()).map(str::to_string);

        self.user_data(token, payload, identity, app_private_key, core_session_token)
            .await
    }

    async fn user_data(
        &self,
        token: &str,
        payload: AuthTokenPayload,
        identity: Address,
        app_private_key: Option<String>,
        core_session_token: Option<String>,
    ) -> Result<UserData, AuthError> {
        if let Some(key) = &app_private_key {
            SecretKey::from_hex(key)
                .map_err(|e| AuthError::MalformedToken(format!("private_key: {}", e)))?;
        }

        let profile = self.resolve_profile(&payload).await?;

        Ok(UserData {
            username: payload.username,
            email: payload.email,
            profile,
            decentralized_id: payload.iss,
            identity_address: identity.to_string(),
            app_private_key,
            core_session_token,
            auth_response_token: token.to_string(),
            hub_url: payload
                .hub_url
                .unwrap_or_else(|| DEFAULT_HUB_URL.to_string()),
            association_token: payload.association_token,
            hub_config: None,
        })
    }

    /// Profile from `profile_url` when present, otherwise the inline claim.
    ///
    /// A profile host that answers with an error or garbage yields an empty
    /// profile; only a transport failure is an error.
    pub async fn resolve_profile(&self, payload: &AuthTokenPayload) -> Result<Value, AuthError> {
        let Some(profile_url) = payload.profile_url.as_deref() else {
            return Ok(payload.profile.clone().unwrap_or_else(empty_profile));
        };

        let url = match Url::parse(profile_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("ignoring unparseable profile url {}: {}", profile_url, e);
                return Ok(empty_profile());
            }
        };

        let response = self.transport.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            tracing::warn!(
                "profile fetch from {} failed with status {}",
                profile_url,
                response.status
            );
            return Ok(empty_profile());
        }

        let records: Vec<Value> = match response.json() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("profile at {} is not a JSON array: {}", profile_url, e);
                return Ok(empty_profile());
            }
        };

        let Some(first) = records.into_iter().next() else {
            return Ok(empty_profile());
        };

        match first.get("token").and_then(Value::as_str) {
            Some(token) => match extract_profile_claim(token) {
                Ok(claim) => Ok(claim),
                Err(e) => {
                    tracing::warn!("discarding profile token from {}: {}", profile_url, e);
                    Ok(empty_profile())
                }
            },
            None => Ok(first),
        }
    }
}

fn empty_profile() -> Value {
    Value::Object(Default::default())
}

/// Absent, empty and the literal `"null"` all mean no value
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != "null")
}

fn decrypt_claim(
    claim: &'static str,
    value: Option<&str>,
    transit_key: &SecretKey,
) -> Result<Option<String>, AuthError> {
    let Some(value) = present(value) else {
        return Ok(None);
    };

    let bytes = hex::decode(value)
        .map_err(|e| AuthError::MalformedToken(format!("{} is not hex: {}", claim, e)))?;
    let envelope = CipherEnvelope::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{}: {}", claim, e)))?;

    match envelope
        .decrypt(transit_key)
        .map_err(|source| AuthError::DecryptionFailed { claim, source })?
    {
        Content::Text(text) => Ok(Some(text)),
        Content::Binary(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| AuthError::MalformedToken(format!("{} is not text", claim))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::CryptoError;
    use crate::testkit::{AuthResponseBuilder, ScriptedTransport};
    use crate::transport::HttpResponse;
    use http::StatusCode;
    use serde_json::json;

    struct Fixture {
        identity: SecretKey,
        app_key: SecretKey,
        transit: SecretKey,
        transport: Arc<ScriptedTransport>,
        verifier: AuthVerifier,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::default());
        Fixture {
            identity: SecretKey::generate().unwrap(),
            app_key: SecretKey::generate().unwrap(),
            transit: SecretKey::generate().unwrap(),
            verifier: AuthVerifier::new(transport.clone()),
            transport,
        }
    }

    #[tokio::test]
    async fn test_verify_and_decode() {
        let f = fixture();
        let token = AuthResponseBuilder::new(&f.identity)
            .username("alice.id")
            .app_key(&f.app_key)
            .core_token("core-session")
            .hub_url("https://hub.example.com")
            .profile(json!({"name": "Alice"}))
            .encrypt_to(&f.transit.public())
            .build()
            .unwrap();

        let user = f.verifier.verify_and_decode(&token, &f.transit).await.unwrap();
        assert_eq!(user.username.as_deref(), Some("alice.id"));
        assert_eq!(user.app_private_key, Some(f.app_key.to_hex()));
        assert_eq!(user.core_session_token.as_deref(), Some("core-session"));
        assert_eq!(user.hub_url, "https://hub.example.com");
        assert_eq!(user.profile["name"], "Alice");
        assert_eq!(
            user.identity_address,
            f.identity.public().address().to_string()
        );
        assert_eq!(user.auth_response_token, token);
        assert!(f.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_forged_token_never_yields_user_data() {
        let f = fixture();
        let mallory = SecretKey::generate().unwrap();
        // well formed claims naming alice, signed by someone else
        let token = AuthResponseBuilder::new(&f.identity)
            .app_key(&f.app_key)
            .encrypt_to(&f.transit.public())
            .signed_by(&mallory)
            .build()
            .unwrap();

        assert!(matches!(
            f.verifier.verify_and_decode(&token, &f.transit).await,
            Err(AuthError::InvalidSignature)
        ));
        assert!(matches!(
            f.verifier.verify_unencrypted(&token).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_issuer_key_must_match_did() {
        let f = fixture();
        let mallory = SecretKey::generate().unwrap();
        // self-consistent signature, but the key is not the issuer's
        let token = AuthResponseBuilder::new(&f.identity)
            .issuer_key(&mallory.public())
            .signed_by(&mallory)
            .build()
            .unwrap();
        assert!(matches!(
            verify_auth_response(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_wrong_transit_key() {
        let f = fixture();
        let other = SecretKey::generate().unwrap();
        let token = AuthResponseBuilder::new(&f.identity)
            .app_key(&f.app_key)
            .encrypt_to(&other.public())
            .build()
            .unwrap();

        match f.verifier.verify_and_decode(&token, &f.transit).await {
            Err(AuthError::DecryptionFailed {
                claim: "private_key",
                source: CryptoError::MacMismatch,
            }) => {}
            other => panic!("expected DecryptionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_null_claims_are_absent() {
        let f = fixture();
        let token = AuthResponseBuilder::new(&f.identity)
            .claim("private_key", json!("null"))
            .claim("core_token", json!(null))
            .build()
            .unwrap();

        let user = f.verifier.verify_and_decode(&token, &f.transit).await.unwrap();
        assert!(user.app_private_key.is_none());
        assert!(user.core_session_token.is_none());
        assert_eq!(user.hub_url, DEFAULT_HUB_URL);
    }

    #[tokio::test]
    async fn test_unencrypted_sign_in() {
        let f = fixture();
        let token = AuthResponseBuilder::new(&f.identity)
            .app_key(&f.app_key)
            .build()
            .unwrap();

        let user = f.verifier.verify_unencrypted(&token).await.unwrap();
        assert_eq!(user.app_private_key, Some(f.app_key.to_hex()));

        // plaintext key handed to the encrypted flow is not an envelope
        assert!(matches!(
            f.verifier.verify_and_decode(&token, &f.transit).await,
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_and_future_tokens() {
        let f = fixture();
        let now = chrono::Utc::now().timestamp();

        let expired = AuthResponseBuilder::new(&f.identity)
            .claim("exp", json!(now - CLOCK_SKEW_SECS - 60))
            .build()
            .unwrap();
        assert!(matches!(
            verify_auth_response(&expired),
            Err(AuthError::TokenExpired)
        ));

        let future = AuthResponseBuilder::new(&f.identity)
            .claim("iat", json!(now + CLOCK_SKEW_SECS + 60))
            .build()
            .unwrap();
        assert!(matches!(
            verify_auth_response(&future),
            Err(AuthError::IssuedInFuture)
        ));
    }

    #[tokio::test]
    async fn test_profile_from_url() {
        let f = fixture();
        let profile_token = crate::auth::TokenSigner::new(&f.identity)
            .sign(&json!({
                "issuer": {"publicKey": f.identity.public().to_hex()},
                "claim": {"name": "Alice from url"}
            }))
            .unwrap();
        f.transport.push_response(HttpResponse::json_body(
            StatusCode::OK,
            &json!([{"token": profile_token}]),
        ));

        let token = AuthResponseBuilder::new(&f.identity)
            .profile_url("https://gaia.example.com/hub/profile.json")
            .build()
            .unwrap();
        let user = f.verifier.verify_unencrypted(&token).await.unwrap();
        assert_eq!(user.profile["name"], "Alice from url");

        let requests = f.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url.as_str(),
            "https://gaia.example.com/hub/profile.json"
        );
    }

    #[tokio::test]
    async fn test_profile_fetch_failures_are_not_fatal() {
        let f = fixture();
        let token = AuthResponseBuilder::new(&f.identity)
            .profile_url("https://gaia.example.com/hub/profile.json")
            .build()
            .unwrap();

        f.transport
            .push_response(HttpResponse::new(StatusCode::NOT_FOUND, "missing"));
        let user = f.verifier.verify_unencrypted(&token).await.unwrap();
        assert_eq!(user.profile, json!({}));

        f.transport
            .push_response(HttpResponse::json_body(StatusCode::OK, &json!([])));
        let user = f.verifier.verify_unencrypted(&token).await.unwrap();
        assert_eq!(user.profile, json!({}));

        f.transport.push_response(HttpResponse::json_body(
            StatusCode::OK,
            &json!([{"name": "plain record"}]),
        ));
        let user = f.verifier.verify_unencrypted(&token).await.unwrap();
        assert_eq!(user.profile["name"], "plain record");
    }

    #[test]
    fn test_timestamps_without_claims() {
        let payload = AuthTokenPayload::default();
        check_timestamps(&payload, 0).unwrap();
    }

    #[test]
    fn test_expiry_allows_clock_skew() {
        let now = 1_700_000_000;
        let expired_at = |exp: i64| AuthTokenPayload {
            exp: Some(exp),
            ..Default::default()
        };

        check_timestamps(&expired_at(now - 10), now).unwrap();
        check_timestamps(&expired_at(now - CLOCK_SKEW_SECS), now).unwrap();
        assert!(matches!(
            check_timestamps(&expired_at(now - CLOCK_SKEW_SECS - 1), now),
            Err(AuthError::TokenExpired)
        ));
    }
}
