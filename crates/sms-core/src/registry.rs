use std::sync::Arc;

use crate::{GatewayAdapter, GatewayConfig, SmsError};

/// Builds a gateway connection from its configuration.
pub type AdapterConstructor =
    Arc<dyn Fn(&GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> + Send + Sync>;

/// Runtime registry so apps can register any combination of gateways and treat them interchangeably.
///
/// Entries keep their registration order; the facade's fallback scan walks
/// them in that order.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    entries: Arc<Vec<(&'static str, AdapterConstructor)>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
        }
    }

    /// Register `constructor` under `name`. Registering a name twice replaces
    /// the constructor but keeps the original position.
    pub fn with<F>(mut self, name: &'static str, constructor: F) -> Self
    where
        F: Fn(&GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, SmsError> + Send + Sync + 'static,
    {
        let constructor: AdapterConstructor = Arc::new(constructor);
        let mut entries = (*self.entries).clone();
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = constructor,
            None => entries.push((name, constructor)),
        }
        self.entries = Arc::new(entries);
        self
    }

    pub fn get(&self, name: &str) -> Option<AdapterConstructor> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, constructor)| constructor.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == name)
    }

    /// Registered identifiers in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &AdapterConstructor)> + '_ {
        self.entries
            .iter()
            .map(|(name, constructor)| (*name, constructor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
