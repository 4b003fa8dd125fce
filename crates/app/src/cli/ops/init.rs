use clap::Args;

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Origin to sign in as (e.g. https://notes.example.com)
    #[arg(long)]
    pub app_origin: Option<String>,

    /// Name lookup service for reading other users' files
    #[arg(long)]
    pub lookup_url: Option<url::Url>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("invalid app origin: {0}")]
    InvalidOrigin(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(origin) = &self.app_origin {
            let parsed = url::Url::parse(origin)
                .map(|url| url.origin())
                .ok()
                .filter(|origin| origin.is_tuple())
                .ok_or_else(|| InitError::InvalidOrigin(origin.clone()))?;
            config.app_origin = parsed.ascii_serialization();
        }
        if let Some(lookup_url) = &self.lookup_url {
            config.lookup_url = lookup_url.as_str().trim_end_matches('/').to_string();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }

        let state = AppState::init(ctx.config_path.clone(), config)?;

        Ok(format!(
            "Initialized hubkit in {}\n  app origin: {}\n  lookup:     {}",
            state.hubkit_dir.display(),
            state.config.app_origin,
            state.config.lookup_url,
        ))
    }
}
