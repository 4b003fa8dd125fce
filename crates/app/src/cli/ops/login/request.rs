use clap::Args;
use common::auth::{AuthError, AuthRequest, DEFAULT_SCOPES};
use common::session::SessionError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Request {
    /// Scopes to ask for (defaults to store_write)
    #[arg(long = "scope")]
    pub scopes: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginRequestError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("failed to sign auth request: {0}")]
    Auth(#[from] AuthError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Request {
    type Error = LoginRequestError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = ctx.client()?;

        // the pending transit key is persisted, so `login complete` can run
        // in a later process
        let transit_key = client.session.begin_sign_in()?;

        let scopes: Vec<&str> = if self.scopes.is_empty() {
            DEFAULT_SCOPES.to_vec()
        } else {
            self.scopes.iter().map(String::as_str).collect()
        };
        let request = AuthRequest::new(&transit_key, &client.config.app_origin, &scopes);
        let token = request.sign(&transit_key)?;

        tracing::info!(
            "auth request {} for {} expires at {}",
            request.jti,
            request.domain_name,
            request.exp
        );
        Ok(token)
    }
}
