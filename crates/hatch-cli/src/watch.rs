//! Config hot reload.
//!
//! Watches the directory containing the config file (editors typically
//! replace the file rather than write it in place), debounces the event
//! burst, then reloads and swaps the dispatcher's registry. A reload that
//! fails to parse or validate keeps the previous registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hatch_tunnel::Dispatcher;

use crate::config;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Start watching `config_path` and hot-swap the dispatcher's registry on
/// change. The returned watcher must be kept alive for the watch to stay
/// active.
pub fn spawn(config_path: PathBuf, dispatcher: Dispatcher) -> notify::Result<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel::<()>(16);
    let file_name = config_path.file_name().map(|n| n.to_os_string());

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let Ok(event) = result else { return };
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        let ours = event
            .paths
            .iter()
            .any(|path| path.file_name() == file_name.as_deref());
        if ours {
            // Full queue just means a reload is already pending.
            let _ = tx.try_send(());
        }
    })?;

    let dir = config_path.parent().filter(|p| !p.as_os_str().is_empty());
    watcher.watch(dir.unwrap_or(Path::new(".")), RecursiveMode::NonRecursive)?;
    debug!(path = %config_path.display(), "watching config for changes");

    tokio::spawn(reload_loop(config_path, dispatcher, rx));

    Ok(watcher)
}

async fn reload_loop(
    config_path: PathBuf,
    dispatcher: Dispatcher,
    mut rx: mpsc::Receiver<()>,
) {
    while rx.recv().await.is_some() {
        // Coalesce the save burst: keep absorbing events until the file
        // has been quiet for the debounce window.
        while let Ok(Some(())) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {}

        match config::load(&config_path) {
            Ok((_, registry)) => {
                info!(actions = registry.len(), "config reloaded");
                dispatcher.update_registry(registry);
            }
            Err(e) => {
                warn!(error = %e, "config reload failed, keeping previous actions");
            }
        }
    }
}
