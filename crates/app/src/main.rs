// CLI modules
mod cli;
mod logging;
mod state;
mod version;

use std::str::FromStr;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Get, Init, Login, Logout, Ls, Put, Rm, Version, Whoami};
use tracing::level_filters::LevelFilter;

command_enum! {
    (Init, Init),
    (Login, Login),
    (Whoami, Whoami),
    (Put, Put),
    (Get, Get),
    (Ls, Ls),
    (Rm, Rm),
    (Logout, Logout),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log level: explicit flag > config file > warn
    let level = args
        .log_level
        .as_deref()
        .and_then(|level| LevelFilter::from_str(level).ok())
        .or_else(|| {
            state::AppState::load(args.config_path.clone())
                .ok()
                .map(|state| state.config.log_level())
        })
        .unwrap_or(LevelFilter::WARN);
    let guard = logging::init_logging(level);

    let ctx = cli::op::OpContext::new(args.config_path);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered logs before exiting
    drop(guard);
    std::process::exit(code);
}
