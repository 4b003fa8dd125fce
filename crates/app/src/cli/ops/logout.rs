use clap::Args;
use common::session::SessionError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Logout;

#[derive(Debug, thiserror::Error)]
pub enum LogoutError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Logout {
    type Error = LogoutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;
        let was_signed_in = client.session.is_signed_in();
        client.session.sign_user_out()?;

        Ok(if was_signed_in {
            "Signed out".to_string()
        } else {
            "Not signed in".to_string()
        })
    }
}
