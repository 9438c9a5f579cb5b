//! Signal Registry
//!
//! Maps names to signals so that every lookup of a name returns the same
//! signal. The registry is a concurrent map; creation goes through its entry
//! API, so two threads asking for a new name at the same time still end up
//! with one signal.
//!
//! # Typed Lookups
//!
//! Signals are stored type-erased. A lookup names the payload and result
//! types it expects; asking for an existing name with other types fails with
//! [`SignalError::TypeMismatch`] rather than creating a second signal.
//!
//! # Global Registry
//!
//! [`SignalRegistry::global`] is created on first use and lives for the rest
//! of the process. [`SignalRegistry::init_global`] can set its configuration,
//! but only before anything else touched it.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::signal::Signal;
use crate::config::SignalConfig;
use crate::error::{Result, SignalError};

static GLOBAL: OnceLock<SignalRegistry> = OnceLock::new();

/// Name-to-signal map.
pub struct SignalRegistry {
    signals: DashMap<Arc<str>, Box<dyn Any + Send + Sync>>,
    config: SignalConfig,
}

impl SignalRegistry {
    /// Create an empty registry whose signals use the default configuration.
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    /// Create an empty registry whose signals all use `config`.
    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            signals: DashMap::new(),
            config,
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static SignalRegistry {
        GLOBAL.get_or_init(SignalRegistry::new)
    }

    /// Create the process-wide registry with `config`.
    ///
    /// Fails if the global registry already exists, whether from an earlier
    /// call or from any use of [`global`](Self::global).
    pub fn init_global(config: SignalConfig) -> Result<&'static SignalRegistry> {
        let mut created = false;
        let registry = GLOBAL.get_or_init(|| {
            created = true;
            SignalRegistry::with_config(config)
        });
        if created {
            Ok(registry)
        } else {
            Err(SignalError::AlreadyInitialized)
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Get the signal called `name`, creating it on first use.
    ///
    /// An empty name returns a new anonymous signal that is not stored.
    pub fn get_or_create<A, R>(&self, name: &str) -> Result<Signal<A, R>>
    where
        A: Send + Sync + 'static,
        R: Send + 'static,
    {
        if name.is_empty() {
            return Ok(Signal::create(None, self.config.clone()));
        }

        let entry = self.signals.entry(Arc::from(name)).or_insert_with(|| {
            Box::new(Signal::<A, R>::create(Some(name), self.config.clone()))
        });

        entry
            .value()
            .downcast_ref::<Signal<A, R>>()
            .cloned()
            .ok_or_else(|| SignalError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<Signal<A, R>>(),
            })
    }

    /// Get the signal called `name` if it was created already.
    pub fn get<A, R>(&self, name: &str) -> Result<Option<Signal<A, R>>>
    where
        A: Send + Sync + 'static,
        R: Send + 'static,
    {
        let Some(entry) = self.signals.get(name) else {
            return Ok(None);
        };
        entry
            .value()
            .downcast_ref::<Signal<A, R>>()
            .cloned()
            .map(Some)
            .ok_or_else(|| SignalError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<Signal<A, R>>(),
            })
    }

    /// Whether a signal named `name` has been created in this registry.
    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// Number of named signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Names of all registered signals, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.signals.iter().map(|entry| entry.key().to_string()).collect()
    }
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("signals", &self.signals.len())
            .field("config", &self.config)
            .finish()
    }
}
