pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hubkit")]
#[command(about = "Encrypted, signed file storage on your app's hub")]
pub struct Args {
    /// Path to the hubkit config directory (defaults to ~/.hubkit)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
