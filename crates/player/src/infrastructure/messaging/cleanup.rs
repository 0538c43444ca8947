//! Cleanup handlers run when the session is lost for good.

use std::panic::{catch_unwind, AssertUnwindSafe};

pub type CleanupCallback = Box<dyn FnOnce() + Send + 'static>;

/// Ordered, identifier-keyed cleanup handlers.
///
/// Unlike message handlers, a second registration under an existing
/// identifier is ignored: the first one wins.
#[derive(Default)]
pub struct CleanupRegistry {
    handlers: Vec<(String, CleanupCallback)>,
    running: bool,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the identifier is taken or teardown is running.
    pub fn add(&mut self, identifier: impl Into<String>, callback: CleanupCallback) -> bool {
        let identifier = identifier.into();
        if self.running {
            tracing::debug!(identifier = %identifier, "Ignoring cleanup handler added during teardown");
            return false;
        }
        if self.contains(&identifier) {
            tracing::debug!(identifier = %identifier, "Cleanup handler already registered");
            return false;
        }
        self.handlers.push((identifier, callback));
        true
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.handlers.iter().any(|(id, _)| id == identifier)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler once, in registration order, then forget them.
    pub fn run_all(&mut self) -> usize {
        self.running = true;
        let handlers = std::mem::take(&mut self.handlers);
        let count = handlers.len();
        for (identifier, callback) in handlers {
            if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                tracing::error!(identifier = %identifier, "Cleanup handler panicked");
            }
        }
        self.running = false;
        tracing::info!(count, "Ran cleanup handlers");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_each_handler_once_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CleanupRegistry::new();

        for label in ["game", "ui"] {
            let order = Arc::clone(&order);
            registry.add(
                label,
                Box::new(move || order.lock().expect("lock").push(label)),
            );
        }

        assert_eq!(registry.run_all(), 2);
        assert_eq!(registry.run_all(), 0);
        assert_eq!(*order.lock().expect("lock"), vec!["game", "ui"]);
    }

    #[test]
    fn duplicate_identifier_keeps_the_first() {
        let mut registry = CleanupRegistry::new();
        assert!(registry.add("main", Box::new(|| {})));
        assert!(!registry.add("main", Box::new(|| {})));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("main"));
    }
}
