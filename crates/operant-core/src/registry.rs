use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::{ComponentSpec, PanelConfig};

pub type Constructor<T> = Box<dyn Fn(&ComponentSpec) -> Result<T> + Send + Sync>;

/// Explicit mapping from a declared component kind to its constructor.
/// Configuration never triggers open-ended dynamic instantiation: a panel
/// config is validated against the registry before anything is built.
pub struct ConstructorRegistry<T> {
    constructors: BTreeMap<String, Constructor<T>>,
}

impl<T> ConstructorRegistry<T> {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        kind: impl Into<String>,
        constructor: impl Fn(&ComponentSpec) -> Result<T> + Send + Sync + 'static,
    ) {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    pub fn known_kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Load-time validation: every declared kind has a constructor and role
    /// names are unique within the panel.
    pub fn validate(&self, config: &PanelConfig) -> Result<()> {
        let mut roles = BTreeSet::new();
        for spec in &config.components {
            if !roles.insert(spec.role.as_str()) {
                bail!(
                    "panel {}: duplicate component role {:?}",
                    config.id,
                    spec.role
                );
            }
            if !self.constructors.contains_key(&spec.kind) {
                bail!(
                    "panel {}: component {:?} declares unknown kind {:?}",
                    config.id,
                    spec.role,
                    spec.kind
                );
            }
        }
        Ok(())
    }

    pub fn construct(&self, spec: &ComponentSpec) -> Result<T> {
        debug!(role = %spec.role, kind = %spec.kind, "constructing component");
        let constructor = self
            .constructors
            .get(&spec.kind)
            .with_context(|| format!("unknown component kind {:?}", spec.kind))?;
        constructor(spec)
            .with_context(|| format!("constructing component {:?} ({})", spec.role, spec.kind))
    }
}

impl<T> Default for ConstructorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
