use std::path::{Path, PathBuf};

use clap::Args;
use common::content::Content;
use common::crypto::{KeyError, PublicKey};
use common::storage::{PutFileOptions, StorageError};

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Path in the bucket
    pub path: String,

    /// Local file to upload
    #[arg(long, group = "source")]
    pub file: Option<PathBuf>,

    /// Inline text to upload
    #[arg(long, group = "source")]
    pub text: Option<String>,

    /// Store the content in the clear
    #[arg(long)]
    pub no_encrypt: bool,

    /// Encrypt to this public key (hex) instead of the app key
    #[arg(long, conflicts_with = "no_encrypt")]
    pub encrypt_to: Option<String>,

    /// Sign the content with the app key
    #[arg(long)]
    pub sign: bool,

    /// Content type for unencrypted uploads (guessed from --file otherwise)
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid --encrypt-to key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Either --file or --text must be provided")]
    NoContent,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (content, guessed_type) = match (&self.file, &self.text) {
            (Some(file), _) => read_file(file).await?,
            (None, Some(text)) => (Content::Text(text.clone()), None),
            (None, None) => return Err(PutError::NoContent),
        };

        let mut options = PutFileOptions::default()
            .encrypt(!self.no_encrypt)
            .sign(self.sign);
        if let Some(key) = &self.encrypt_to {
            options = options.encryption_key(PublicKey::from_hex(key)?);
        }
        if let Some(content_type) = self.content_type.clone().or(guessed_type) {
            options = options.content_type(content_type);
        }

        let client = ctx.client()?;
        let size = content.len();
        let public_url = client
            .storage
            .put_file(&self.path, content, &options)
            .await
            .inspect_err(|e| {
                if let StorageError::SignatureUploadFailed { public_url, .. } = e {
                    tracing::warn!(
                        "content is live at {}; rerun with --sign to repair its signature",
                        public_url
                    );
                }
            })?;

        Ok(format!("Uploaded {} ({} bytes)\n{}", self.path, size, public_url))
    }
}

/// File contents, as text when the type and bytes agree, plus the guessed type
async fn read_file(path: &Path) -> Result<(Content, Option<String>), PutError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| PutError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mime = mime_guess::from_path(path).first();
    let is_text = mime
        .as_ref()
        .map(|mime| mime.type_() == mime_guess::mime::TEXT)
        .unwrap_or(false);

    let content = if is_text {
        match String::from_utf8(bytes) {
            Ok(text) => Content::Text(text),
            Err(e) => Content::Binary(e.into_bytes()),
        }
    } else {
        Content::Binary(bytes)
    };
    Ok((content, mime.map(|mime| mime.to_string())))
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_read_file_detects_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "hello").await.unwrap();

        let (content, content_type) = read_file(&path).await.unwrap();
        assert_eq!(content, Content::Text("hello".to_string()));
        assert_eq!(content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_read_file_keeps_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        tokio::fs::write(&path, [0x89u8, b'P', b'N', b'G']).await.unwrap();

        let (content, content_type) = read_file(&path).await.unwrap();
        assert!(!content.is_text());
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_file(&dir.path().join("missing.txt")).await;
        assert!(matches!(result, Err(PutError::Read { .. })));
    }
}
