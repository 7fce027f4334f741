//! Lifecycle hook registry.
//!
//! The `onbefore` / `onbeforeSwap` / `onafterSwap` / `onafter` attributes
//! name hooks registered here. Resolution happens once per binding at
//! registration; invocation is guarded, so a failing hook is logged and never
//! aborts the surrounding pipeline.

use anyhow::Error;
use dom::{Document, NodeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A registered lifecycle hook, invoked with the document and the bound
/// element.
pub type Hook = Arc<dyn Fn(&mut Document, NodeId) -> Result<(), Error> + Send + Sync>;

#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Hook>,
}

impl HookRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn register<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&mut Document, NodeId) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(hook));
    }

    #[inline]
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Hook> {
        self.hooks.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::HookRegistry;
    use dom::Document;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resolves_registered_hooks() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut registry = HookRegistry::new();
        registry.register("mark", move |_doc, _node| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let hook = registry.resolve("mark").unwrap();
        let mut doc = Document::new();
        let node = doc.root();
        hook(&mut doc, node).unwrap();
        hook(&mut doc, node).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(registry.resolve("other").is_none());
    }
}
