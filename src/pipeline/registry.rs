//! Registry of node factories keyed by implementation handle.
//!
//! Graph descriptions name node implementations by handle string. Node packages
//! register a factory for each handle before any graph is loaded; the loader
//! only ever looks handles up here.

use crate::pipeline::node::Node;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Creates a fresh, unconfigured node.
pub type NodeFactory = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Handle → factory mapping.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: BTreeMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `handle`, replacing any previous one.
    pub fn register<F>(&mut self, handle: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        let handle = handle.into();
        if self.factories.insert(handle.clone(), Arc::new(factory)).is_some() {
            tracing::warn!(handle = %handle, "Node factory replaced");
        }
        self
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.factories.contains_key(handle)
    }

    /// Instantiate a node for `handle`, if registered.
    pub fn create(&self, handle: &str) -> Option<Box<dyn Node>> {
        self.factories.get(handle).map(|factory| factory())
    }

    /// Registered handles in sorted order.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("handles", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::port::PortDescriptor;

    struct Dummy;

    impl Node for Dummy {
        fn ports(&self) -> &[PortDescriptor] {
            &[]
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = NodeRegistry::new();
        registry.register("dummy", || Box::new(Dummy));

        assert!(registry.contains("dummy"));
        assert!(registry.create("dummy").is_some());
        assert!(registry.create("other").is_none());
        assert_eq!(registry.handles().collect::<Vec<_>>(), vec!["dummy"]);
    }

    #[test]
    fn test_factories_produce_independent_nodes() {
        let mut registry = NodeRegistry::new();
        registry.register("dummy", || Box::new(Dummy));
        let a = registry.create("dummy");
        let b = registry.create("dummy");
        assert!(a.is_some() && b.is_some());
        assert_eq!(registry.len(), 1);
    }
}
