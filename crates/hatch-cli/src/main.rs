//! hatch — expose local actions as MCP tools through a relay tunnel.
//!
//! Loads an action config (`hatch.yaml`), connects one persistent
//! WebSocket to the relay, and serves MCP callers from behind NAT with no
//! listening port. The config hot-reloads while the tunnel is up.

mod commands;
mod config;
mod watch;

use std::path::Path;

use clap::{Parser, Subcommand};
use tracing::error;

/// hatch — local actions as MCP tools over a public tunnel URL
#[derive(Parser)]
#[command(
    name = "hatch",
    version,
    about = "Expose local scripts and HTTP APIs as MCP tools via a secure tunnel URL",
    arg_required_else_help = true
)]
struct Cli {
    /// Config file path
    #[arg(short = 'c', long = "config", global = true, default_value = "hatch.yaml")]
    config: String,

    /// Relay server URL
    #[arg(long, global = true, default_value = "wss://relay.hatch.sh")]
    relay: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the tunnel and serve actions from the config file
    Run,

    /// Create a sample hatch.yaml config file
    Init,

    /// Check the config file for errors before running
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("hatch=debug,hatch_cli=debug,hatch_tunnel=debug,hatch_core=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("hatch=warn,hatch_cli=warn,hatch_tunnel=warn")
            .with_target(false)
            .init();
    }

    let config_path = Path::new(&cli.config);

    let result = match cli.command {
        Command::Run => commands::run::run(config_path, &cli.relay).await,
        Command::Init => commands::init::run(config_path),
        Command::Validate => commands::validate::run(config_path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("hatch: {e:#}");
        std::process::exit(1);
    }
}
