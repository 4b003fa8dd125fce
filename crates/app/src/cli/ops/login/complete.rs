use clap::Args;
use common::session::SessionError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Complete {
    /// Auth response token from the identity provider
    pub auth_response: String,

    /// Accept a response whose secrets were not encrypted to a transit key
    #[arg(long)]
    pub unencrypted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginCompleteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("sign-in failed: {0}")]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Complete {
    type Error = LoginCompleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let token = self.auth_response.trim();

        let user = if self.unencrypted {
            client
                .session
                .handle_unencrypted_sign_in(&client.verifier, token)
                .await?
        } else {
            client
                .session
                .handle_pending_sign_in(&client.verifier, token)
                .await?
        };

        let hub = client.session.connect(client.transport.as_ref()).await?;

        Ok(format!(
            "Signed in as {}\n  hub:    {}\n  bucket: {}",
            user.username.as_deref().unwrap_or(&user.decentralized_id),
            hub.server,
            hub.bucket_url(),
        ))
    }
}
