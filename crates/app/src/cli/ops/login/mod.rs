use clap::{Args, Subcommand};

pub mod complete;
pub mod request;

use crate::cli::op::Op;

crate::command_enum! {
    (Request, request::Request),
    (Complete, complete::Complete),
}

pub type LoginCommand = Command;

/// Sign in through an identity provider.
///
/// `login request` prints a signed auth request for the provider;
/// `login complete` accepts the auth response it hands back.
#[derive(Args, Debug, Clone)]
pub struct Login {
    #[command(subcommand)]
    pub command: LoginCommand,
}

#[async_trait::async_trait]
impl Op for Login {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
