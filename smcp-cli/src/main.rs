//! Interactive shell driving one in-process Computer instance: add/start MCP
//! servers, attach it to a Signaling Hub as a Computer, and exercise tool
//! calls, desktop views, and input resolution from the same terminal.

mod args;
mod commands;
mod error;
mod logging;
mod pending;
mod repl;
mod socket;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Name this Computer announces when it joins an office.
    #[arg(long, default_value = "computer1")]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = logging::init();

    let args = Args::parse();
    info!(computer = %args.name, "starting smcp shell");

    let state = Arc::new(AppState::new(args.name).await);
    repl::run(state).await
}
