use clap::Args;
use common::storage::StorageError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Stop after this many entries
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let limit = self.limit.unwrap_or(usize::MAX);

        let mut names = Vec::new();
        if limit > 0 {
            client
                .storage
                .list_files(|name| {
                    names.push(name.to_string());
                    Ok(names.len() < limit)
                })
                .await?;
        }

        if names.is_empty() {
            Ok("No files found".to_string())
        } else {
            Ok(names.join("\n"))
        }
    }
}
