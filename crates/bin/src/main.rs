use std::io::{self, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod document;
mod output;

use cli::{Cli, Commands};
use output::OutputFormat;

fn main() {
    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("livetree=info".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let format = OutputFormat::from(cli.format);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Check(args) => commands::check::run(&args, format, &mut out)?,
        Commands::Fmt(args) => commands::fmt::run(&args, &mut out)?,
        Commands::Immutable(args) => commands::show::run(&args, format, &mut out)?,
        Commands::Nodes(args) => commands::nodes::run(&args, format, &mut out)?,
        Commands::Replay(args) => commands::replay::run(&args, format, &mut out)?,
    }
    out.flush()?;
    Ok(())
}
