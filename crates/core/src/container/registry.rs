use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::container::definition::ServiceDefinition;
use crate::errors::ContainerError;

/// Registry mapping service names to definitions, with alias chains, an
/// override policy fixed at construction, and a cache of merged definitions.
///
/// Registration and removal tolerate concurrent readers: name iteration
/// works on snapshots, and the merged cache is invalidated rather than
/// locked against structural changes.
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<ServiceDefinition>>>,
    /// Registration order, used for eager initialization and iteration
    order: RwLock<Vec<String>>,
    /// alias -> target; chains allowed, cycles rejected at registration
    aliases: RwLock<HashMap<String, String>>,
    merged: RwLock<HashMap<String, Arc<ServiceDefinition>>>,
    allow_override: bool,
    frozen: AtomicBool,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::with_override_policy(true)
    }

    pub fn with_override_policy(allow_override: bool) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            aliases: RwLock::new(HashMap::new()),
            merged: RwLock::new(HashMap::new()),
            allow_override,
            frozen: AtomicBool::new(false),
        }
    }

    /// Register a definition under a unique name.
    ///
    /// Replacing an existing definition is subject to the override policy;
    /// a rejection carries both definition descriptions for diagnostics.
    pub fn register(&self, name: &str, definition: ServiceDefinition) -> Result<(), ContainerError> {
        if name.is_empty() {
            return Err(ContainerError::illegal_state(
                "service name must not be empty",
            ));
        }
        self.check_frozen(name)?;

        let mut definitions = self
            .definitions
            .write()
            .map_err(|_| ContainerError::lock_poisoned("definitions"))?;

        if let Some(existing) = definitions.get(name) {
            if !self.allow_override {
                return Err(ContainerError::DefinitionOverrideRejected {
                    name: name.to_string(),
                    existing: existing.description(),
                    incoming: definition.description(),
                });
            }
        } else {
            self.order
                .write()
                .map_err(|_| ContainerError::lock_poisoned("definition order"))?
                .push(name.to_string());
        }
        definitions.insert(name.to_string(), Arc::new(definition));
        drop(definitions);

        self.invalidate_merged()?;
        Ok(())
    }

    /// Remove a definition by name
    pub fn remove(&self, name: &str) -> Result<(), ContainerError> {
        self.check_frozen(name)?;

        let removed = self
            .definitions
            .write()
            .map_err(|_| ContainerError::lock_poisoned("definitions"))?
            .remove(name);
        if removed.is_none() {
            return Err(ContainerError::no_such_definition(name));
        }
        self.order
            .write()
            .map_err(|_| ContainerError::lock_poisoned("definition order"))?
            .retain(|n| n != name);

        self.invalidate_merged()?;
        Ok(())
    }

    /// Register `alias` as another name for `name`.
    ///
    /// Chains are allowed; an alias that would, directly or transitively,
    /// point back to itself is rejected before any state changes.
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), ContainerError> {
        self.check_frozen(alias)?;

        let mut aliases = self
            .aliases
            .write()
            .map_err(|_| ContainerError::lock_poisoned("aliases"))?;

        if alias == name {
            aliases.remove(alias);
            return Ok(());
        }
        if let Some(existing) = aliases.get(alias) {
            if existing != name && !self.allow_override {
                return Err(ContainerError::illegal_state(format!(
                    "alias '{alias}' already points to '{existing}' and overriding is disallowed"
                )));
            }
        }

        // walk the chain starting at the target; reaching the new alias
        // means the registration would close a cycle
        let mut current = name;
        while let Some(next) = aliases.get(current) {
            if next == alias {
                return Err(ContainerError::AliasCycle {
                    name: name.to_string(),
                    alias: alias.to_string(),
                });
            }
            current = next;
        }

        aliases.insert(alias.to_string(), name.to_string());
        Ok(())
    }

    /// Resolve an alias chain to the underlying registered name
    pub fn canonical_name(&self, name: &str) -> String {
        let aliases = match self.aliases.read() {
            Ok(aliases) => aliases,
            Err(_) => return name.to_string(),
        };
        let mut current = name;
        while let Some(next) = aliases.get(current) {
            current = next;
        }
        current.to_string()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions
            .read()
            .map(|d| d.contains_key(name))
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.definitions.read().ok()?.get(name).cloned()
    }

    /// Snapshot of registered names in registration order, safe to iterate
    /// while other threads mutate the registry
    pub fn names(&self) -> Vec<String> {
        self.order.read().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disallow any further structural change
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    fn check_frozen(&self, name: &str) -> Result<(), ContainerError> {
        if self.is_frozen() {
            return Err(ContainerError::RegistryFrozen {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn cached_merged(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.merged.read().ok()?.get(name).cloned()
    }

    pub(crate) fn cache_merged(
        &self,
        name: &str,
        definition: Arc<ServiceDefinition>,
    ) -> Result<(), ContainerError> {
        self.merged
            .write()
            .map_err(|_| ContainerError::lock_poisoned("merged definitions"))?
            .insert(name.to_string(), definition);
        Ok(())
    }

    fn invalidate_merged(&self) -> Result<(), ContainerError> {
        self.merged
            .write()
            .map_err(|_| ContainerError::lock_poisoned("merged definitions"))?
            .clear();
        Ok(())
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &self.len())
            .field("allow_override", &self.allow_override)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
