use std::path::PathBuf;

use clap::Args;
use common::content::Content;
use common::storage::{GetFileOptions, StorageError};

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Path in the bucket
    pub path: String,

    /// Read the stored bytes without decrypting
    #[arg(long)]
    pub no_decrypt: bool,

    /// Require a valid signature from the bucket owner
    #[arg(long)]
    pub verify: bool,

    /// Read from this user's bucket instead of your own
    #[arg(long)]
    pub username: Option<String>,

    /// App whose bucket to read (defaults to the configured origin)
    #[arg(long, requires = "username")]
    pub app_origin: Option<String>,

    /// Write the content here instead of printing it
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Print the file's public URL instead of fetching it
    #[arg(long)]
    pub url: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut options = GetFileOptions::default()
            .decrypt(!self.no_decrypt)
            .verify(self.verify);
        if let Some(username) = &self.username {
            options = options.username(username.clone());
        }
        if let Some(app_origin) = &self.app_origin {
            options = options.app_origin(app_origin.clone());
        }

        let client = ctx.client()?;
        if self.url {
            let url = client.storage.get_file_url(&self.path, &options).await?;
            return Ok(url.to_string());
        }

        let content = client.storage.get_file(&self.path, &options).await?;

        match &self.output {
            Some(output) => {
                tokio::fs::write(output, content.as_bytes())
                    .await
                    .map_err(|source| GetError::Write {
                        path: output.clone(),
                        source,
                    })?;
                Ok(format!("Wrote {} bytes to {}", content.len(), output.display()))
            }
            None => Ok(render(content)),
        }
    }
}

fn render(content: Content) -> String {
    match content {
        Content::Text(text) => text,
        Content::Binary(bytes) => format!(
            "Binary content ({} bytes, use --output to save): {}",
            bytes.len(),
            hex::encode(&bytes[..bytes.len().min(64)])
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_text_verbatim() {
        assert_eq!(render(Content::Text("hi\n".to_string())), "hi\n");
    }

    #[test]
    fn test_render_binary_summary() {
        let rendered = render(Content::Binary(vec![0xde, 0xad, 0xbe, 0xef]));
        assert!(rendered.contains("4 bytes"));
        assert!(rendered.ends_with("deadbeef"));
    }
}
