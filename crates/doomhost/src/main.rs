use std::process::ExitCode;

use clap::Parser;
use doomhost::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "doomhost exited with an error");
            eprintln!("doomhost: {e}");
            ExitCode::FAILURE
        }
    }
}
