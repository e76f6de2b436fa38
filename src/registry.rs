//! Name-based client plugin registry
//!
//! Backend clients register a factory under a short name; the control
//! surface resolves names to fresh client instances when a run is
//! configured. Factories must be callable repeatedly since every
//! [`Driver::init`](crate::Driver::init) consumes a new instance.

use crate::client::Client;
use crate::core::BenchError;
use ahash::AHashMap;
use tracing::warn;

type ClientFactory = Box<dyn Fn() -> Box<dyn Client> + Send + Sync>;

/// Maps client names to factories producing fresh instances
#[derive(Default)]
pub struct ClientRegistry {
    factories: AHashMap<String, ClientFactory>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Client> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            warn!(name, "replacing previously registered client");
        }
    }

    /// Build a fresh instance of the client registered under `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn Client>, BenchError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(BenchError::Initialization(format!(
                "no client registered under '{name}'; registered clients: [{}]",
                self.names().join(", ")
            ))),
        }
    }

    /// All registered client names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DataGenerator;
    use std::sync::Arc;

    struct NullClient;

    impl Client for NullClient {
        fn init(&mut self, _generator: Arc<dyn DataGenerator>) -> Result<(), BenchError> {
            Ok(())
        }

        fn read_single(&self, _key: &str) -> Result<Option<String>, BenchError> {
            Ok(None)
        }

        fn write_single(&self, key: &str) -> Result<String, BenchError> {
            Ok(key.to_string())
        }

        fn connection_info(&self) -> String {
            "null".to_string()
        }
    }

    #[test]
    fn create_returns_fresh_instances() {
        let mut registry = ClientRegistry::new();
        registry.register("null", || Box::new(NullClient));
        assert!(registry.create("null").is_ok());
        assert!(registry.create("null").is_ok());
    }

    #[test]
    fn unknown_name_lists_registered_clients() {
        let mut registry = ClientRegistry::new();
        registry.register("redis", || Box::new(NullClient));
        registry.register("cassandra", || Box::new(NullClient));
        // `unwrap_err` needs `Debug` on the Ok type, which `dyn Client` lacks
        let err = match registry.create("memcached") {
            Err(err) => err,
            Ok(_) => panic!("expected an error for an unregistered client"),
        };
        let message = err.to_string();
        assert!(message.contains("memcached"));
        assert!(message.contains("cassandra, redis"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ClientRegistry::new();
        registry.register("b", || Box::new(NullClient));
        registry.register("a", || Box::new(NullClient));
        registry.register("c", || Box::new(NullClient));
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reregistering_replaces_the_factory() {
        let mut registry = ClientRegistry::new();
        registry.register("null", || Box::new(NullClient));
        registry.register("null", || Box::new(NullClient));
        assert_eq!(registry.names().len(), 1);
    }
}
