mod cache;
mod cli;
mod core;
mod error;
mod extract;
mod finder;
mod http;
mod oracle;
mod payloads;
mod reporting;
mod scanner;
#[cfg(test)]
mod testutil;
mod ui;

use clap::Parser;
use crate::cli::args::{Cli, Command};
use crate::core::engine::Engine;

const BANNER: &str = r#"
  _     _ _           _     _       _     _
 | |__ | (_)_ __   __| |___(_) __ _| |__ | |_
 | '_ \| | | '_ \ / _` / __| |/ _` | '_ \| __|
 | |_) | | | | | | (_| \__ \ | (_| | | | | |_
 |_.__/|_|_|_| |_|\__,_|___/_|\__, |_| |_|\__|
                              |___/
"#;

fn print_banner() {
    eprintln!("\x1b[1m\x1b[36m{BANNER}\x1b[0m");
    eprintln!("\x1b[35m        boolean-based blind SQLi, one bit at a time\x1b[0m\n");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "blindsight=debug" } else { "blindsight=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Exploit(args) => args.general.verbose,
        Command::Detect(args) => args.general.verbose,
    };

    print_banner();
    init_tracing(verbose);

    let engine = Engine::new(cli);
    if let Err(e) = engine.run().await {
        ui::error(format!("{e:#}"));
        std::process::exit(1);
    }

    Ok(())
}
