use clap::Args;
use common::session::SessionState;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Whoami {
    /// Negotiate a hub connection if none is cached
    #[arg(long)]
    pub connect: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WhoamiError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("session error: {0}")]
    Session(#[from] common::session::SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Whoami {
    type Error = WhoamiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        if self.connect && client.session.is_signed_in() {
            client
                .session
                .hub_config_or_connect(client.transport.as_ref())
                .await?;
        }

        let state = client.session.state();
        let (key, user) = match (state.key(), state.user()) {
            (Some(key), Some(user)) => (key, user),
            _ => {
                let pending = if client.session.transit_key().is_some() {
                    " (sign-in pending)"
                } else {
                    ""
                };
                return Ok(format!("Not signed in{}", pending));
            }
        };

        let mut lines = vec![
            format!("user:         {}", user.username.as_deref().unwrap_or("-")),
            format!("did:          {}", user.decentralized_id),
            format!("app address:  {}", key.public().address()),
            format!("hub url:      {}", user.hub_url),
        ];
        match &state {
            SessionState::Connected { hub, .. } => {
                lines.push(format!("bucket:       {}", hub.bucket_url()));
                if let Some(max) = hub.max_upload_bytes() {
                    lines.push(format!("upload limit: {} bytes", max));
                }
            }
            _ => lines.push("bucket:       (not connected)".to_string()),
        }
        Ok(lines.join("\n"))
    }
}
