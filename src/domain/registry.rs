//! Typed registries for pluggable run components.
//!
//! Each pluggable kind owns one registry mapping a name to a zero-argument
//! factory. Names are resolved once while the run is being configured.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::blotter::{Blotter, CancelPolicy, SimulationBlotter};
use crate::domain::error::{RegistryError, RunError};
use crate::domain::metrics::{self, MetricsSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    MetricsSet,
    Blotter,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::MetricsSet => write!(f, "metrics set"),
            ComponentKind::Blotter => write!(f, "blotter"),
        }
    }
}

pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

pub struct Registry<T> {
    kind: ComponentKind,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T> Registry<T> {
    pub fn new(kind: ComponentKind) -> Self {
        Registry {
            kind,
            factories: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn register(&mut self, name: &str, factory: Factory<T>) -> Result<(), RegistryError> {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        self.factories
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Build a fresh instance of the component registered as `name`.
    pub fn load(&self, name: &str) -> Result<T, RunError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RunError::UnknownComponent {
                kind: self.kind,
                name: name.to_string(),
            })?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// The registries an extension host populates.
#[derive(Debug)]
pub struct ComponentRegistry {
    pub metrics_sets: Registry<MetricsSet>,
    pub blotters: Registry<Box<dyn Blotter>>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        ComponentRegistry {
            metrics_sets: Registry::new(ComponentKind::MetricsSet),
            blotters: Registry::new(ComponentKind::Blotter),
        }
    }

    /// Registries seeded with the stock components:
    /// - metrics sets `default` (every builtin metric) and `none`
    /// - blotter `default` (orders live until filled or cancelled)
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let stock: [(&str, Factory<MetricsSet>); 2] = [
            ("default", Arc::new(metrics::default_metrics)),
            ("none", Arc::new(MetricsSet::empty)),
        ];
        for (name, factory) in stock {
            // Fresh registries cannot collide.
            let _ = registry.metrics_sets.register(name, factory);
        }
        let _ = registry.blotters.register(
            "default",
            Arc::new(|| Box::new(SimulationBlotter::new(CancelPolicy::Never)) as Box<dyn Blotter>),
        );
        registry
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A component given either by registered name or as a live instance.
pub enum ComponentSpec<T> {
    Named(String),
    Instance(T),
}

impl<T> ComponentSpec<T> {
    pub fn resolve(self, registry: &Registry<T>) -> Result<T, RunError> {
        match self {
            ComponentSpec::Instance(component) => Ok(component),
            ComponentSpec::Named(name) => registry.load(&name),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ComponentSpec::Named(name) => Some(name),
            ComponentSpec::Instance(_) => None,
        }
    }
}

impl<T> From<&str> for ComponentSpec<T> {
    fn from(name: &str) -> Self {
        ComponentSpec::Named(name.to_string())
    }
}

impl<T> From<String> for ComponentSpec<T> {
    fn from(name: String) -> Self {
        ComponentSpec::Named(name)
    }
}

impl<T> fmt::Debug for ComponentSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentSpec::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ComponentSpec::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}
