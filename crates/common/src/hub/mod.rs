//! Hub connection
//!
//! A hub hands out a challenge from `GET <server>/hub_info`. Signing that
//! challenge with the app key yields the bearer token for the bucket owned
//! by the app key's address. Nothing is exchanged: the token is computed
//! locally and the hub checks it on every write.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{decode_token, AuthError, TokenSigner};
use crate::crypto::{Address, CryptoError, KeyError, PublicKey, SecretKey, SignatureEnvelope};
use crate::transport::{HttpRequest, Transport, TransportError};

pub const V1_TOKEN_PREFIX: &str = "v1:";

const SALT_SIZE: usize = 16;

/// A bucket path that cannot be turned into an object URL
#[derive(Debug, thiserror::Error)]
pub enum ObjectUrlError {
    #[error("invalid url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("invalid file path: {0:?}")]
    InvalidPath(String),
}

/// Appends `path` to `base` one segment at a time, so `#`, `?` and `%` in a
/// file name are percent-encoded instead of changing the URL's meaning.
///
/// Empty, `.` and `..` segments are refused: hubs key objects by the literal
/// path and would otherwise store them under a different name.
pub fn object_url(base: &str, path: &str) -> Result<Url, ObjectUrlError> {
    if path.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
        return Err(ObjectUrlError::InvalidPath(path.to_string()));
    }
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(path.split('/'));
    Ok(url)
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub connect failed with status {status}: {body}")]
    Connect { status: StatusCode, body: String },
    #[error("malformed hub response: {0}")]
    MalformedResponse(String),
    #[error("invalid hub url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("token error: {0}")]
    Token(#[from] AuthError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Everything needed to address one bucket on one hub.
///
/// Immutable: a refresh builds a new config and the session swaps it in
/// whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    pub server: String,
    pub address: String,
    pub token: String,
    pub url_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_upload_size_megabytes: Option<f64>,
}

impl HubConfig {
    pub fn bucket_address(&self) -> Result<Address, KeyError> {
        self.address.parse()
    }

    /// `<server>/store/<address>/<path>`
    pub fn store_url(&self, path: &str) -> Result<Url, ObjectUrlError> {
        object_url(&format!("{}/store/{}", self.server, self.address), path)
    }

    /// `<server>/delete/<address>/<path>`
    pub fn delete_url(&self, path: &str) -> Result<Url, ObjectUrlError> {
        object_url(&format!("{}/delete/{}", self.server, self.address), path)
    }

    /// `<server>/list-files/<address>`
    pub fn list_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}/list-files/{}", self.server, self.address))
    }

    /// Public read prefix of this bucket, always ending in `/`
    pub fn bucket_url(&self) -> String {
        format!("{}{}/", self.url_prefix, self.address)
    }

    pub fn read_url(&self, path: &str) -> Result<Url, ObjectUrlError> {
        object_url(&self.bucket_url(), path)
    }

    pub fn max_upload_bytes(&self) -> Option<u64> {
        self.max_file_upload_size_megabytes
            .filter(|mb| *mb > 0.0)
            .map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }
}

/// `GET /hub_info` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubInfo {
    pub challenge_text: String,
    pub read_url_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_auth_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_upload_size_megabytes: Option<f64>,
}

impl HubInfo {
    /// Hubs that predate versioned tokens only accept the legacy format
    pub fn supports_v1_auth(&self) -> bool {
        self.latest_auth_version
            .as_deref()
            .and_then(|v| v.strip_prefix('v'))
            .and_then(|v| v.parse::<u32>().ok())
            .map(|v| v >= 1)
            .unwrap_or(false)
    }
}

/// Claims of a `v1:` bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubAuthClaims {
    pub gaia_challenge: String,
    pub hub_url: String,
    /// Hex public key of the bucket owner
    pub iss: String,
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_token: Option<String>,
}

/// Fetch the hub's challenge and build a config for the bucket of `key`
pub async fn connect(
    transport: &dyn Transport,
    hub_url: &str,
    key: &SecretKey,
    association_token: Option<&str>,
) -> Result<HubConfig, HubError> {
    let server = hub_url.trim_end_matches('/').to_string();
    let info_url = Url::parse(&format!("{}/hub_info", server))?;

    tracing::debug!("connect: fetching hub info from {}", info_url);
    let response = transport.execute(HttpRequest::get(info_url)).await?;
    if !response.is_success() {
        return Err(HubError::Connect {
            status: response.status,
            body: response.text_lossy(),
        });
    }
    let info: HubInfo = response
        .json()
        .map_err(|e| HubError::MalformedResponse(e.to_string()))?;

    let token = if info.supports_v1_auth() {
        v1_token(&info.challenge_text, &server, key, association_token)?
    } else {
        tracing::debug!("connect: {} only supports legacy tokens", server);
        legacy_token(&info.challenge_text, key)?
    };

    let address = key.public().address().to_string();
    tracing::info!("connected to hub {} as {}", server, address);

    Ok(HubConfig {
        server,
        address,
        token,
        url_prefix: info.read_url_prefix,
        max_file_upload_size_megabytes: info.max_file_upload_size_megabytes,
    })
}

pub fn v1_token(
    challenge: &str,
    hub_url: &str,
    key: &SecretKey,
    association_token: Option<&str>,
) -> Result<String, HubError> {
    let mut salt = [0u8; SALT_SIZE];
    getrandom::getrandom(&mut salt)
        .map_err(|e| anyhow::anyhow!("failed to generate token salt: {}", e))?;

    let claims = HubAuthClaims {
        gaia_challenge: challenge.to_string(),
        hub_url: hub_url.to_string(),
        iss: key.public().to_hex(),
        salt: hex::encode(salt),
        association_token: association_token.map(str::to_string),
    };
    let token = TokenSigner::new(key).sign(&claims)?;
    Ok(format!("{}{}", V1_TOKEN_PREFIX, token))
}

/// base64 of `{publicKey, signature}` over the bare challenge
pub fn legacy_token(challenge: &str, key: &SecretKey) -> Result<String, HubError> {
    let envelope = SignatureEnvelope::sign(challenge.as_bytes(), key);
    let json = envelope
        .to_json()
        .map_err(|e| anyhow::anyhow!("failed to encode legacy token: {}", e))?;
    Ok(STANDARD.encode(json))
}

/// Check a bearer token the way a hub does and return the address it
/// grants write access to.
///
/// Used by the in-memory hub; a client never needs to verify its own token.
pub fn verify_bearer_token(token: &str, challenge: &str) -> Result<Address, HubError> {
    if let Some(token) = token.strip_prefix(V1_TOKEN_PREFIX) {
        let decoded = decode_token(token)?;
        let claims: HubAuthClaims = decoded.claims()?;
        let key = PublicKey::from_hex(&claims.iss)?;
        decoded.verify(&key)?;
        if claims.gaia_challenge != challenge {
            return Err(HubError::Token(AuthError::MalformedToken(
                "challenge mismatch".to_string(),
            )));
        }
        return Ok(key.address());
    }

    let json = STANDARD
        .decode(token)
        .map_err(|e| HubError::Token(AuthError::MalformedToken(e.to_string())))?;
    let envelope = SignatureEnvelope::from_slice(&json).map_err(crypto_to_token_error)?;
    envelope
        .verify_detached(challenge.as_bytes(), None)
        .map_err(crypto_to_token_error)?;
    Ok(envelope.signer().map_err(crypto_to_token_error)?.address())
}

fn crypto_to_token_error(err: CryptoError) -> HubError {
    match err {
        CryptoError::InvalidSignature => HubError::Token(AuthError::InvalidSignature),
        other => HubError::Token(AuthError::MalformedToken(other.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::ScriptedTransport;
    use crate::transport::HttpResponse;
    use serde_json::json;

    fn hub_info(version: Option<&str>) -> HttpResponse {
        HttpResponse::json_body(
            StatusCode::OK,
            &json!({
                "challenge_text": "[\"gaiahub\",\"0\",\"hub.example.com\",\"blockstack_storage_please_sign\"]",
                "read_url_prefix": "https://reads.example.com/",
                "latest_auth_version": version,
                "max_file_upload_size_megabytes": 20
            }),
        )
    }

    #[tokio::test]
    async fn test_connect_v1() {
        let transport = ScriptedTransport::default();
        transport.push_response(hub_info(Some("v1")));
        let key = SecretKey::generate().unwrap();

        let config = connect(&transport, "https://hub.example.com/", &key, Some("assoc"))
            .await
            .unwrap();

        assert_eq!(config.server, "https://hub.example.com");
        assert_eq!(config.address, key.public().address().to_string());
        assert_eq!(config.url_prefix, "https://reads.example.com/");
        assert_eq!(config.max_upload_bytes(), Some(20 * 1024 * 1024));
        assert!(config.token.starts_with(V1_TOKEN_PREFIX));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "https://hub.example.com/hub_info");

        let challenge = "[\"gaiahub\",\"0\",\"hub.example.com\",\"blockstack_storage_please_sign\"]";
        let granted = verify_bearer_token(&config.token, challenge).unwrap();
        assert_eq!(granted, key.public().address());

        let token = config.token.strip_prefix(V1_TOKEN_PREFIX).unwrap();
        let claims: HubAuthClaims = decode_token(token).unwrap().claims().unwrap();
        assert_eq!(claims.hub_url, "https://hub.example.com");
        assert_eq!(claims.association_token.as_deref(), Some("assoc"));
        assert_eq!(claims.salt.len(), SALT_SIZE * 2);
    }

    #[tokio::test]
    async fn test_connect_legacy() {
        let transport = ScriptedTransport::default();
        transport.push_response(hub_info(None));
        let key = SecretKey::generate().unwrap();

        let config = connect(&transport, "https://hub.example.com", &key, None)
            .await
            .unwrap();
        assert!(!config.token.starts_with(V1_TOKEN_PREFIX));

        let challenge = "[\"gaiahub\",\"0\",\"hub.example.com\",\"blockstack_storage_please_sign\"]";
        let granted = verify_bearer_token(&config.token, challenge).unwrap();
        assert_eq!(granted, key.public().address());
        assert!(verify_bearer_token(&config.token, "another challenge").is_err());
    }

    #[tokio::test]
    async fn test_connect_error_status() {
        let transport = ScriptedTransport::default();
        transport.push_response(HttpResponse::new(StatusCode::BAD_GATEWAY, "upstream down"));
        let key = SecretKey::generate().unwrap();

        match connect(&transport, "https://hub.example.com", &key, None).await {
            Err(HubError::Connect { status, body }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected Connect error, got {:?}", other),
        }
        // no retry
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_malformed_info() {
        let transport = ScriptedTransport::default();
        transport.push_response(HttpResponse::json_body(StatusCode::OK, &json!({"hello": 1})));
        let key = SecretKey::generate().unwrap();
        assert!(matches!(
            connect(&transport, "https://hub.example.com", &key, None).await,
            Err(HubError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_config_urls() {
        let config = HubConfig {
            server: "https://hub.example.com".to_string(),
            address: "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH".to_string(),
            token: "v1:x".to_string(),
            url_prefix: "https://reads.example.com/".to_string(),
            max_file_upload_size_megabytes: None,
        };
        assert_eq!(
            config.store_url("dir/a.txt").unwrap().as_str(),
            "https://hub.example.com/store/1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH/dir/a.txt"
        );
        assert_eq!(
            config.read_url("a.txt").unwrap().as_str(),
            "https://reads.example.com/1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH/a.txt"
        );
        assert_eq!(
            config.list_url().unwrap().as_str(),
            "https://hub.example.com/list-files/1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert_eq!(config.max_upload_bytes(), None);
    }

    #[test]
    fn test_object_url_encodes_reserved_characters() {
        let base = "https://hub.example.com/store/1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

        let url = object_url(base, "notes#2.txt").unwrap();
        assert_eq!(url.fragment(), None);
        assert!(url.path().ends_with("/notes%232.txt"));

        let url = object_url(base, "report?v=1.txt").unwrap();
        assert_eq!(url.query(), None);
        assert!(url.path().ends_with("/report%3Fv=1.txt"));

        let url = object_url(base, "dir/100%.txt").unwrap();
        assert!(url.path().ends_with("/dir/100%25.txt"));
    }

    #[test]
    fn test_object_url_keeps_trailing_slash_base() {
        let url = object_url("https://reads.example.com/bucket/", "a.txt").unwrap();
        assert_eq!(url.as_str(), "https://reads.example.com/bucket/a.txt");
    }

    #[test]
    fn test_object_url_rejects_dot_segments() {
        let base = "https://hub.example.com/store/addr";
        for path in ["", "drafts/../a.txt", "..", "./a.txt", "a//b.txt", "dir/"] {
            assert!(
                matches!(object_url(base, path), Err(ObjectUrlError::InvalidPath(_))),
                "{:?} should be rejected",
                path
            );
        }
    }
}
