//! Runtime map from scheme name to handler.
//!
//! The registry is read on every logical request and written rarely (setup, teardown, test
//! injection), so it is held in an `ArcSwap`: readers take a snapshot without locking, and
//! writers publish a new map.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::debug;

use crate::{scheme, AuthHandler, HandlerManifest};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid handler name {0:?}")]
    InvalidName(String),
    #[error("Invalid handler manifest: {0}")]
    InvalidManifest(String),
}

/// A handler tagged with the name it was registered under.
#[derive(Clone)]
pub struct RegisteredHandler {
    name: Arc<str>,
    handler: Arc<dyn AuthHandler>,
}

impl RegisteredHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &dyn AuthHandler {
        self.handler.as_ref()
    }

    pub fn manifest(&self) -> &HandlerManifest {
        self.handler.manifest()
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("manifest", self.handler.manifest())
            .finish()
    }
}

pub struct HandlerRegistry {
    handlers: ArcSwap<HashMap<String, RegisteredHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// A registry holding every built-in scheme.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, handler) in scheme::builtin_handlers() {
            if let Err(error) = registry.add_handler(handler, name) {
                // Built-in manifests are static, so this only fires on a programming error.
                tracing::error!(%name, %error, "failed to register built-in handler");
            }
        }
        registry
    }

    /// Register `handler` under `name`, replacing any handler already registered there.
    pub fn add_handler(
        &self,
        handler: Arc<dyn AuthHandler>,
        name: &str,
    ) -> Result<(), RegistryError> {
        let valid_name = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid_name {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        handler.manifest().validate()?;

        let registered = RegisteredHandler {
            name: Arc::from(name),
            handler,
        };
        self.handlers.rcu(|current| {
            let mut handlers = HashMap::clone(current);
            handlers.insert(name.to_owned(), registered.clone());
            handlers
        });
        debug!(%name, "registered auth handler");
        Ok(())
    }

    pub fn get_handler(&self, name: &str) -> Option<RegisteredHandler> {
        self.handlers.load().get(name).cloned()
    }

    /// Remove the handler registered under `name`. Removing an unknown name is a no-op.
    pub fn remove_handler(&self, name: &str) {
        if !self.handlers.load().contains_key(name) {
            return;
        }
        self.handlers.rcu(|current| {
            let mut handlers = HashMap::clone(current);
            handlers.remove(name);
            handlers
        });
        debug!(%name, "removed auth handler");
    }

    /// Names of all registered handlers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.load().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry, populated with the built-in schemes on first use.
pub fn global() -> Arc<HandlerRegistry> {
    static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();
    GLOBAL
        .get_or_init(|| Arc::new(HandlerRegistry::with_builtins()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::Basic;

    #[test]
    fn test_builtins_registered() {
        let registry = HandlerRegistry::with_builtins();
        for name in [
            "noauth", "basic", "bearer", "apikey", "digest", "ntlm", "oauth1", "oauth2", "awsv4",
            "hawk", "edgegrid", "oci-v1", "jwt",
        ] {
            let handler = registry.get_handler(name);
            assert!(handler.is_some(), "{name} not registered");
            assert_eq!(handler.unwrap().name(), name);
        }
    }

    #[test]
    fn test_add_replaces_and_remove_is_idempotent() {
        let registry = HandlerRegistry::new();
        registry.add_handler(Arc::new(Basic::new()), "custom").unwrap();
        registry.add_handler(Arc::new(Basic::new()), "custom").unwrap();
        assert_eq!(registry.names(), ["custom"]);

        registry.remove_handler("custom");
        registry.remove_handler("custom");
        assert!(registry.get_handler("custom").is_none());
    }

    #[test]
    fn test_default_is_empty() {
        assert!(HandlerRegistry::default().names().is_empty());
    }

    #[test]
    fn test_challenge_schemes_are_interactive() {
        let registry = HandlerRegistry::with_builtins();
        let interactive: Vec<String> = registry
            .names()
            .into_iter()
            .filter(|name| registry.get_handler(name).unwrap().handler().interactive())
            .collect();
        assert_eq!(interactive, ["digest", "ntlm"]);
    }

    #[test]
    fn test_reject_invalid_name() {
        let registry = HandlerRegistry::new();
        let result = registry.add_handler(Arc::new(Basic::new()), "has space");
        assert!(matches!(result, Err(RegistryError::InvalidName(_))));
    }
}
