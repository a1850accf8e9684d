mod cli;
mod commands;
mod formatting;
mod progress;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_export, run_pages};
use dex_lib::ExportMode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dex=debug,dex_lib=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Current { export, path } => {
            run_export(&raw_args, args.config, ExportMode::Single, export, path).await
        }
        Commands::All { export } => {
            run_export(&raw_args, args.config, ExportMode::All, export, None).await
        }
        Commands::Pages { pages, format } => run_pages(args.config, pages, format),
    }
}
