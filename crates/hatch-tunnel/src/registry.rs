//! Hot-swappable registry slot shared by the dispatcher and the hosting
//! process.

use std::sync::{Arc, RwLock};

use hatch_core::action::ActionRegistry;

/// Single-slot holder for the current action registry snapshot.
///
/// `current` hands out a reference to an immutable snapshot; `replace`
/// swaps the slot wholesale. A reader that already holds a snapshot keeps
/// seeing it unchanged — a swap only becomes visible on the next
/// `current` call.
#[derive(Clone)]
pub struct RegistryCell {
    inner: Arc<RwLock<Arc<ActionRegistry>>>,
}

impl RegistryCell {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The current snapshot. The lock is held only for the clone of the
    /// inner `Arc`, never across an invocation.
    pub fn current(&self) -> Arc<ActionRegistry> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, registry: ActionRegistry) {
        let next = Arc::new(registry);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_core::action::{Action, ProcessRunner, Runner};
    use std::collections::HashMap;

    fn registry_with(names: &[&str]) -> ActionRegistry {
        ActionRegistry::from_actions(
            names
                .iter()
                .map(|name| Action {
                    name: name.to_string(),
                    description: String::new(),
                    parameters: Vec::new(),
                    runner: Runner::Process(ProcessRunner {
                        shell: Some("true".into()),
                        ..Default::default()
                    }),
                    environment: HashMap::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn replace_is_visible_on_next_read() {
        let cell = RegistryCell::new(registry_with(&["old"]));
        assert!(cell.current().get("old").is_some());

        cell.replace(registry_with(&["new"]));
        let now = cell.current();
        assert!(now.get("old").is_none());
        assert!(now.get("new").is_some());
    }

    #[test]
    fn held_snapshot_survives_replace() {
        let cell = RegistryCell::new(registry_with(&["old"]));
        let held = cell.current();

        cell.replace(registry_with(&["new"]));

        // The reader that grabbed a snapshot before the swap still sees
        // the old registry, consistent and untorn.
        assert!(held.get("old").is_some());
        assert!(held.get("new").is_none());
        assert!(cell.current().get("new").is_some());
    }

    #[test]
    fn clones_share_the_slot() {
        let cell = RegistryCell::new(registry_with(&["a"]));
        let other = cell.clone();
        other.replace(registry_with(&["b"]));
        assert!(cell.current().get("b").is_some());
    }
}
