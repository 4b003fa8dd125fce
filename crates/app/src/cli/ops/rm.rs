use clap::Args;
use common::storage::StorageError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// Path in the bucket
    pub path: String,

    /// Also delete the companion `.sig` file
    #[arg(long)]
    pub with_signature: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rm {
    type Error = RmError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        if self.with_signature {
            client.storage.delete_file_with_signature(&self.path).await?;
        } else {
            client.storage.delete_file(&self.path).await?;
        }
        Ok(format!("Deleted {}", self.path))
    }
}
