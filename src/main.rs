mod cli;
mod engine;
mod logging;
mod model;
mod orchestrator;
mod settings;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    let is_non_tui = args.launch.is_some() || args.json || args.text;

    match cli::run(args).await {
        Ok(()) => {
            // Launched children are detached; exit without waiting on leftover blocking tasks.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
