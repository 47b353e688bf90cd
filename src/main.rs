//! Streaming terminal chat client.
//!
//! ## How to run
//!
//! ```shell
//! $ chatline --token sk-... --http-proxy-url http://127.0.0.1:7890
//! $ chatline --config config.yaml
//! ```
//!
//! Type `quit` to leave.

use std::{io, process::ExitCode};

use anyhow::Context;
use chatline::{
    config::{Flags, UserConfig},
    session,
    transport::HttpClient,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Chat with an OpenAI-compatible model from the terminal.
#[derive(Parser)]
#[command(name = "chatline", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    flags: Flags,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.flags) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(flags: Flags) -> anyhow::Result<()> {
    let config = UserConfig::resolve(flags).context("failed to load configuration")?;
    let client = HttpClient::new(&config.transport()).context("failed to set up HTTP client")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    session::run(
        config.api(),
        config.conversation(),
        &client,
        &mut stdin.lock(),
        &mut stdout.lock(),
    )?;

    Ok(())
}

/// Logs go to stderr so they never interleave with the streamed reply. `RUST_LOG` takes
/// precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "chatline=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}
