use super::{DEFAULT_STRATEGY, EvenLoadSharing, LoadSharing, PriorityLoadSharing};
use crate::config::LoadSharingConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named load-sharing strategies
#[derive(Clone, Default)]
pub struct LoadSharingRegistry {
    strategies: BTreeMap<String, Arc<dyn LoadSharing>>,
}

impl std::fmt::Debug for LoadSharingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSharingRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl LoadSharingRegistry {
    /// Registry with the built-in strategies
    pub fn with_defaults(params: LoadSharingConfig) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(PriorityLoadSharing::new(params)));
        registry.register(Arc::new(EvenLoadSharing::new(params)));
        registry
    }

    /// Add a strategy, replacing any with the same name
    pub fn register(&mut self, strategy: Arc<dyn LoadSharing>) {
        self.strategies
            .insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LoadSharing>> {
        self.strategies.get(name).cloned()
    }

    /// Strategy for `name`, or the default one when the name is unknown
    pub fn get_or_default(&self, name: &str) -> Option<Arc<dyn LoadSharing>> {
        self.get(name).or_else(|| self.get(DEFAULT_STRATEGY))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}
