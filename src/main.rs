mod cli;
mod config;
mod error;
mod extract;
mod model;
mod node;
mod orchestrator;
mod paths;
mod run_id;
mod storage;
mod text_summary;

use clap::Parser;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    match cli::run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
