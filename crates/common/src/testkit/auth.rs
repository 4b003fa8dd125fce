use serde_json::{json, Map, Value};

use crate::auth::{did_from_address, AuthError, TokenSigner};
use crate::content::Content;
use crate::crypto::{CipherEnvelope, PublicKey, SecretKey};

const AUTH_RESPONSE_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

/// Mints auth response tokens the way an identity provider does
#[derive(Debug, Clone)]
pub struct AuthResponseBuilder {
    identity: SecretKey,
    signer: Option<SecretKey>,
    issuer_key: Option<PublicKey>,
    app_key: Option<SecretKey>,
    core_token: Option<String>,
    transit: Option<PublicKey>,
    claims: Map<String, Value>,
    overrides: Map<String, Value>,
}

impl AuthResponseBuilder {
    pub fn new(identity: &SecretKey) -> Self {
        let now = chrono::Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("jti".into(), json!(uuid::Uuid::new_v4().to_string()));
        claims.insert("iat".into(), json!(now));
        claims.insert("exp".into(), json!(now + AUTH_RESPONSE_LIFETIME_SECS));
        claims.insert(
            "iss".into(),
            json!(did_from_address(&identity.public().address())),
        );
        claims.insert("version".into(), json!("1.3.1"));

        Self {
            identity: identity.clone(),
            signer: None,
            issuer_key: None,
            app_key: None,
            core_token: None,
            transit: None,
            claims,
            overrides: Map::new(),
        }
    }

    pub fn username(mut self, username: &str) -> Self {
        self.claims.insert("username".into(), json!(username));
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.claims.insert("email".into(), json!(email));
        self
    }

    pub fn profile(mut self, profile: Value) -> Self {
        self.claims.insert("profile".into(), profile);
        self
    }

    pub fn profile_url(mut self, url: &str) -> Self {
        self.claims.insert("profile_url".into(), json!(url));
        self
    }

    pub fn hub_url(mut self, url: &str) -> Self {
        self.claims.insert("hubUrl".into(), json!(url));
        self
    }

    pub fn association_token(mut self, token: &str) -> Self {
        self.claims.insert("associationToken".into(), json!(token));
        self
    }

    pub fn app_key(mut self, key: &SecretKey) -> Self {
        self.app_key = Some(key.clone());
        self
    }

    pub fn core_token(mut self, token: &str) -> Self {
        self.core_token = Some(token.to_string());
        self
    }

    /// Encrypt the secrets to this transit key instead of sending plaintext
    pub fn encrypt_to(mut self, transit: &PublicKey) -> Self {
        self.transit = Some(*transit);
        self
    }

    /// Sign with a key other than the identity's
    pub fn signed_by(mut self, key: &SecretKey) -> Self {
        self.signer = Some(key.clone());
        self
    }

    /// Advertise a key other than the identity's in `public_keys`
    pub fn issuer_key(mut self, key: &PublicKey) -> Self {
        self.issuer_key = Some(*key);
        self
    }

    /// Set a raw claim, applied after everything else
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.overrides.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> Result<String, AuthError> {
        let mut claims = self.claims.clone();
        let issuer_key = self.issuer_key.unwrap_or_else(|| self.identity.public());
        claims.insert("public_keys".into(), json!([issuer_key.to_hex()]));

        if let Some(app_key) = &self.app_key {
            claims.insert("private_key".into(), json!(self.secret(&app_key.to_hex())?));
        }
        if let Some(core_token) = &self.core_token {
            claims.insert("core_token".into(), json!(self.secret(core_token)?));
        }
        claims.extend(self.overrides.clone());

        let signer = self.signer.as_ref().unwrap_or(&self.identity);
        TokenSigner::new(signer).sign(&Value::Object(claims))
    }

    fn secret(&self, plaintext: &str) -> Result<String, AuthError> {
        let Some(transit) = &self.transit else {
            return Ok(plaintext.to_string());
        };
        let envelope = CipherEnvelope::encrypt(&Content::from(plaintext), transit)
            .and_then(|envelope| envelope.to_json())
            .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        Ok(hex::encode(envelope))
    }
}
