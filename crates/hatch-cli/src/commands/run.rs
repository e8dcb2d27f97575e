//! `hatch run` — load the config, connect the tunnel, serve actions.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use hatch_core::action::Runner;
use hatch_tunnel::{Dispatcher, RegistryCell, SessionConfig, TunnelSession};

use crate::{config, watch};

pub async fn run(config_path: &Path, relay_url: &str) -> Result<()> {
    let (cfg, registry) = config::load(config_path)?;

    // Keep a summary for the startup listing before the registry moves
    // into the swap cell.
    let listing: Vec<(String, &'static str)> = registry
        .actions()
        .iter()
        .map(|action| {
            let kind = match action.runner {
                Runner::Process(_) => "process",
                Runner::Http(_) => "http",
            };
            (action.name.clone(), kind)
        })
        .collect();
    let action_count = registry.len();

    let dispatcher = Dispatcher::new(&cfg.name, &cfg.version, RegistryCell::new(registry));

    // Hot reload is best-effort: a broken watcher should not stop the run.
    let _watcher = match watch::spawn(config_path.to_path_buf(), dispatcher.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "config watcher unavailable, hot reload disabled");
            None
        }
    };

    println!("Connecting to {relay_url} ...");

    let session_config = SessionConfig {
        relay_url: relay_url.to_string(),
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        action_count,
        on_client_connected: Some(Arc::new(|client_ip: &str| {
            println!("  client connected: {client_ip}");
        })),
        ..Default::default()
    };

    let session = TunnelSession::connect(session_config, dispatcher)
        .await
        .context("connect tunnel")?;

    println!("Connected\n");
    println!("Server URL");
    println!("  {}\n", session.tunnel_url());

    println!("Actions ({})", config_path.display());
    for (name, kind) in &listing {
        println!("  {name:<20} {kind}");
    }
    println!();
    println!(
        "v{}  hot-reload enabled, Ctrl+C to stop\n",
        env!("CARGO_PKG_VERSION")
    );

    session.wait().await.context("tunnel closed")
}
