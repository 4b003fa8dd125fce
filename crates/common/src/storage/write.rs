use bytes::Bytes;
use http::StatusCode;
use serde::Deserialize;

use super::{signature_path, PutFileOptions, Storage, StorageError};
use crate::content::{Content, JSON_CONTENT_TYPE};
use crate::crypto::{CipherEnvelope, SignatureEnvelope};
use crate::transport::HttpRequest;

#[derive(Debug, Deserialize)]
struct StoreResponse {
    #[serde(rename = "publicURL")]
    public_url: Option<String>,
}

impl Storage {
    /// Write `content` to `path` and return its public URL.
    ///
    /// With `sign` and without `encrypt` the content is written first and
    /// its `.sig` companion second. If the second write fails the content
    /// stays and [`StorageError::SignatureUploadFailed`] says so.
    pub async fn put_file(
        &self,
        path: &str,
        content: impl Into<Content>,
        options: &PutFileOptions,
    ) -> Result<String, StorageError> {
        let content = content.into();

        if options.encrypt {
            let key = self.session.app_key()?;
            let recipient = options.encryption_key.unwrap_or_else(|| key.public());
            let envelope = CipherEnvelope::encrypt(&content, &recipient)?;
            let body = if options.sign {
                SignatureEnvelope::sign_envelope(&envelope, &key)?.to_json()?
            } else {
                envelope.to_json()?
            };
            return self.upload(path, Bytes::from(body), JSON_CONTENT_TYPE).await;
        }

        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| content.default_content_type().to_string());
        let body = Bytes::from(content.into_bytes());
        let public_url = self.upload(path, body.clone(), &content_type).await?;

        if options.sign {
            if let Err(e) = self.put_detached_signature(path, &body).await {
                tracing::warn!("{} written without its signature: {}", path, e);
                return Err(StorageError::SignatureUploadFailed {
                    path: path.to_string(),
                    public_url,
                    source: Box::new(e),
                });
            }
        }
        Ok(public_url)
    }

    /// Sign `body` and write the signature to `<path>.sig`.
    ///
    /// `body` must be exactly the bytes stored at `path`.
    pub async fn put_detached_signature(
        &self,
        path: &str,
        body: &[u8],
    ) -> Result<String, StorageError> {
        let key = self.session.app_key()?;
        let signature = SignatureEnvelope::sign(body, &key).to_json()?;
        self.upload(&signature_path(path), Bytes::from(signature), JSON_CONTENT_TYPE)
            .await
    }

    /// Remove `path`. A file that is already gone counts as deleted.
    pub async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let response = self
            .send_authorized(|hub| {
                Ok(HttpRequest::delete(hub.delete_url(path)?)
                    .content_type(JSON_CONTENT_TYPE)?
                    .bearer(&hub.token)?)
            })
            .await?;

        if response.status == StatusCode::NOT_FOUND {
            tracing::debug!("delete_file: {} was already gone", path);
            return Ok(());
        }
        if !response.is_success() {
            return Err(StorageError::Unknown(format!(
                "failed to delete {}: hub responded {}: {}",
                path,
                response.status,
                response.text_lossy()
            )));
        }
        Ok(())
    }

    /// Remove `path` and its `.sig` companion
    pub async fn delete_file_with_signature(&self, path: &str) -> Result<(), StorageError> {
        self.delete_file(path).await?;
        self.delete_file(&signature_path(path)).await
    }

    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let hub = self.hub().await?;
        if let Some(max) = hub.max_upload_bytes() {
            let size = body.len() as u64;
            if size > max {
                return Err(StorageError::PayloadTooLarge {
                    path: path.to_string(),
                    size,
                    max,
                });
            }
        }

        tracing::debug!("put_file: writing {} ({} bytes)", path, body.len());
        let response = self
            .send_authorized(|hub| {
                Ok(HttpRequest::post(hub.store_url(path)?)
                    .content_type(content_type)?
                    .bearer(&hub.token)?
                    .body(body.clone()))
            })
            .await?;

        if !response.is_success() {
            return Err(StorageError::Unknown(format!(
                "failed to upload {}: hub responded {}: {}",
                path,
                response.status,
                response.text_lossy()
            )));
        }

        let stored: StoreResponse = response.json().map_err(|e| {
            StorageError::Unknown(format!("unreadable upload response for {}: {}", path, e))
        })?;
        stored.public_url.ok_or_else(|| {
            StorageError::Unknown(format!("upload response for {} has no publicURL", path))
        })
    }
}
