use http::StatusCode;
use url::Url;

use super::{signature_path, GetFileOptions, SignatureFailure, Storage, StorageError};
use crate::content::Content;
use crate::crypto::{Address, CipherEnvelope, CryptoError, SignatureEnvelope};
use crate::hub::{object_url, ObjectUrlError};
use crate::resolver::bucket_address;
use crate::transport::{HttpRequest, HttpResponse};

/// Where a read goes and whose signature it expects
struct ReadTarget {
    /// Ends in `/`
    bucket_url: String,
    owner: Address,
}

impl ReadTarget {
    fn url(&self, path: &str) -> Result<Url, ObjectUrlError> {
        object_url(&self.bucket_url, path)
    }
}

impl Storage {
    pub async fn get_file(
        &self,
        path: &str,
        options: &GetFileOptions,
    ) -> Result<Content, StorageError> {
        let target = self.read_target(options).await?;
        let response = self
            .fetch(&target, path)
            .await?
            .ok_or_else(|| StorageError::DoesNotExist(path.to_string()))?;

        match (options.decrypt, options.verify) {
            (true, true) => {
                let signed = SignatureEnvelope::from_slice(&response.body)
                    .map_err(|e| verification_error(path, e))?;
                let envelope = signed
                    .open(Some(&target.owner))
                    .map_err(|e| verification_error(path, e))?;
                Ok(envelope.decrypt(&self.session.app_key()?)?)
            }
            (true, false) => {
                let envelope = CipherEnvelope::from_slice(&response.body)?;
                Ok(envelope.decrypt(&self.session.app_key()?)?)
            }
            (false, true) => {
                self.verify_detached(&target, path, &response.body).await?;
                Ok(plain_content(response))
            }
            (false, false) => Ok(plain_content(response)),
        }
    }

    /// URL `get_file` would read `path` from
    pub async fn get_file_url(
        &self,
        path: &str,
        options: &GetFileOptions,
    ) -> Result<Url, StorageError> {
        let target = self.read_target(options).await?;
        Ok(target.url(path)?)
    }

    async fn read_target(&self, options: &GetFileOptions) -> Result<ReadTarget, StorageError> {
        let Some(username) = options.username.as_deref() else {
            let hub = self.hub().await?;
            let owner = hub
                .bucket_address()
                .map_err(|e| StorageError::Unknown(format!("bad bucket address: {}", e)))?;
            return Ok(ReadTarget {
                bucket_url: hub.bucket_url(),
                owner,
            });
        };

        let app_origin = options
            .app_origin
            .as_deref()
            .or(self.app_origin.as_deref())
            .ok_or(StorageError::MissingAppOrigin)?;
        let resolver = self.resolver.as_ref().ok_or(StorageError::NoResolver)?;

        let mut bucket_url = resolver.app_bucket_url(username, app_origin).await?;
        let owner = bucket_address(&bucket_url)?;
        if !bucket_url.ends_with('/') {
            bucket_url.push('/');
        }
        Ok(ReadTarget { bucket_url, owner })
    }

    /// `None` when the hub reports the file missing
    async fn fetch(
        &self,
        target: &ReadTarget,
        path: &str,
    ) -> Result<Option<HttpResponse>, StorageError> {
        let url = target.url(path)?;
        tracing::debug!("get_file: reading {}", url);

        let response = self.transport.execute(HttpRequest::get(url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(StorageError::Unknown(format!(
                "failed to read {}: hub responded {}: {}",
                path,
                response.status,
                response.text_lossy()
            )));
        }
        Ok(Some(response))
    }

    async fn verify_detached(
        &self,
        target: &ReadTarget,
        path: &str,
        body: &[u8],
    ) -> Result<(), StorageError> {
        let missing = || StorageError::SignatureVerification {
            path: path.to_string(),
            kind: SignatureFailure::Missing,
        };

        let sig_path = signature_path(path);
        let response = match self.fetch(target, &sig_path).await {
            Ok(Some(response)) => response,
            Ok(None) => return Err(missing()),
            Err(e) => {
                tracing::warn!("failed to fetch {}: {}", sig_path, e);
                return Err(missing());
            }
        };

        SignatureEnvelope::from_slice(&response.body)
            .and_then(|envelope| envelope.verify_detached(body, Some(&target.owner)))
            .map_err(|e| verification_error(path, e))
    }
}

fn plain_content(response: HttpResponse) -> Content {
    let content_type = response.content_type().map(str::to_string);
    Content::from_response(response.body.to_vec(), content_type.as_deref())
}

fn verification_error(path: &str, err: CryptoError) -> StorageError {
    match err {
        CryptoError::UnexpectedSigner { expected, actual } => StorageError::UnexpectedSigner {
            path: path.to_string(),
            expected,
            actual,
        },
        CryptoError::InvalidSignature | CryptoError::Malformed(_) | CryptoError::Key(_) => {
            StorageError::SignatureVerification {
                path: path.to_string(),
                kind: SignatureFailure::Invalid,
            }
        }
        other => StorageError::Crypto(other),
    }
}
