use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::container::creator::{create_instance, initialize, populate_properties};
use crate::container::definition::ServiceDefinition;
use crate::container::lifecycle::{DisposalFailure, DisposalRegistry};
use crate::container::merge::merged_definition;
use crate::container::registry::DefinitionRegistry;
use crate::container::resolver::{select_candidate, Candidate, DependencyDescriptor};
use crate::container::scope::{CustomScope, ServiceHandle, ServiceScope};
use crate::container::singleton::SingletonRegistry;
use crate::errors::ContainerError;

thread_local! {
    /// Prototype names the current thread is creating, outermost first.
    /// Prototypes have no early-reference phase, so any re-entry is a cycle.
    static PROTOTYPES_IN_CREATION: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// The service container: definition registry, singleton cache, scope
/// handlers and disposal tracking behind one facade.
///
/// All methods take `&self`; the container is shared across threads as-is
/// or behind an `Arc` when a child container needs a parent handle.
pub struct Container {
    registry: DefinitionRegistry,
    singletons: SingletonRegistry,
    scopes: RwLock<HashMap<String, Arc<dyn CustomScope>>>,
    disposals: DisposalRegistry,
    /// name -> services that declared a depends-on edge to it
    dependents: Mutex<HashMap<String, HashSet<String>>>,
    parent: Option<Arc<Container>>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_override_policy(true)
    }

    /// Create a container with an explicit definition override policy
    pub fn with_override_policy(allow_override: bool) -> Self {
        Self {
            registry: DefinitionRegistry::with_override_policy(allow_override),
            singletons: SingletonRegistry::new(),
            scopes: RwLock::new(HashMap::new()),
            disposals: DisposalRegistry::new(),
            dependents: Mutex::new(HashMap::new()),
            parent: None,
        }
    }

    /// Create a child container delegating misses to `parent`.
    ///
    /// Local definitions shadow parent definitions of the same name, both
    /// for named lookups and for type-based candidate collection.
    pub fn with_parent(parent: Arc<Container>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    pub fn parent(&self) -> Option<&Arc<Container>> {
        self.parent.as_ref()
    }

    // --- registration ---

    /// Register a definition under a unique name
    pub fn register(&self, name: &str, definition: ServiceDefinition) -> Result<(), ContainerError> {
        self.registry.register(name, definition)
    }

    /// Register `alias` as another name for `name`; chains allowed,
    /// cycles rejected
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), ContainerError> {
        self.registry.register_alias(name, alias)
    }

    /// Bind an externally constructed object as a singleton.
    ///
    /// The object participates in type-based resolution via its runtime
    /// type but carries no definition: no primary flag, no priority, no
    /// lifecycle callbacks.
    pub fn register_instance<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: T,
    ) -> Result<(), ContainerError> {
        self.singletons.register_external(name, Arc::new(instance))
    }

    /// Remove a definition; an already created singleton instance is
    /// unaffected
    pub fn remove_definition(&self, name: &str) -> Result<(), ContainerError> {
        self.registry.remove(name)
    }

    /// Install a handler for a custom scope name
    pub fn register_scope(
        &self,
        name: impl Into<String>,
        scope: Arc<dyn CustomScope>,
    ) -> Result<(), ContainerError> {
        self.scopes
            .write()
            .map_err(|_| ContainerError::lock_poisoned("scope handlers"))?
            .insert(name.into(), scope);
        Ok(())
    }

    /// Disallow further definition changes
    pub fn freeze(&self) {
        self.registry.freeze();
    }

    // --- lookup ---

    /// Get the service registered under `name`, creating it according to
    /// its scope. A factory that produced no instance is an error here.
    pub fn get(&self, name: &str) -> Result<ServiceHandle, ContainerError> {
        self.lookup(name)?.ok_or_else(|| {
            ContainerError::service_creation(name, "factory produced no instance")
        })
    }

    /// Like [`get`](Self::get), but a factory that produced no instance
    /// yields `Ok(None)`
    pub fn lookup(&self, name: &str) -> Result<Option<ServiceHandle>, ContainerError> {
        let canonical = self.registry.canonical_name(name);

        if let Some(existing) = self.singletons.get(&canonical)? {
            return Ok(Some(existing));
        }
        if !self.registry.contains(&canonical) {
            return match &self.parent {
                Some(parent) => parent.lookup(&canonical),
                None => Err(ContainerError::no_such_definition(&canonical)),
            };
        }

        let merged = merged_definition(&self.registry, &canonical)?;

        for dep in merged.depends_on() {
            let dep = self.registry.canonical_name(dep);
            if self.has_transitive_dependent(&canonical, &dep)? {
                return Err(ContainerError::circular_reference(
                    &canonical,
                    format!("{canonical} -> {dep} -> {canonical}"),
                ));
            }
            self.record_dependent(&dep, &canonical)?;
            self.get(&dep).map_err(|err| {
                ContainerError::unsatisfied_dependency(
                    &canonical,
                    format!("depends-on '{dep}'"),
                    err,
                )
            })?;
        }

        match merged.scope() {
            ServiceScope::Singleton => self.create_singleton(&canonical, &merged),
            ServiceScope::Prototype => self.create_prototype(&canonical, &merged),
            ServiceScope::Custom(scope) => {
                self.scoped_instance(&canonical, &scope, &merged).map(Some)
            }
        }
    }

    /// Resolve the unique service of type `T`
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let descriptor = DependencyDescriptor::of::<T>();
        let candidates = self.collect_candidates(descriptor.required_type())?;
        match select_candidate(&descriptor, candidates)? {
            Some(name) => self.resolve_named(&name),
            None => Err(ContainerError::NoMatchingService {
                required_type: descriptor.type_name().to_string(),
            }),
        }
    }

    /// Resolve a service of type `T`, narrowing ambiguity by qualifier or
    /// service name
    pub fn resolve_qualified<T: Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Arc<T>, ContainerError> {
        let descriptor = DependencyDescriptor::of::<T>().with_qualifier(qualifier);
        let candidates = self.collect_candidates(descriptor.required_type())?;
        match select_candidate(&descriptor, candidates)? {
            Some(name) => self.resolve_named(&name),
            None => Err(ContainerError::NoMatchingService {
                required_type: descriptor.type_name().to_string(),
            }),
        }
    }

    /// Resolve the service registered under `name`, downcast to `T`
    pub fn resolve_named<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ContainerError> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                service: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Resolve the unique service of type `T`, or `None` when no candidate
    /// is registered
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        let descriptor = DependencyDescriptor::of::<T>().optional();
        match self.resolve_with(&descriptor)? {
            Some(handle) => handle
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ContainerError::TypeMismatch {
                    service: descriptor.type_name().to_string(),
                    expected: std::any::type_name::<T>(),
                }),
            None => Ok(None),
        }
    }

    /// Resolve by name, or `None` when nothing is registered under it
    pub fn try_resolve_named<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.get(name) {
            Ok(handle) => handle
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ContainerError::TypeMismatch {
                    service: name.to_string(),
                    expected: std::any::type_name::<T>(),
                }),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve through an explicit descriptor; `Ok(None)` only for an
    /// optional descriptor with no candidate or no produced instance
    pub fn resolve_with(
        &self,
        descriptor: &DependencyDescriptor,
    ) -> Result<Option<ServiceHandle>, ContainerError> {
        let candidates = self.collect_candidates(descriptor.required_type())?;
        match select_candidate(descriptor, candidates)? {
            Some(name) => {
                if descriptor.is_required() {
                    self.get(&name).map(Some)
                } else {
                    self.lookup(&name)
                }
            }
            None => Ok(None),
        }
    }

    // --- introspection ---

    /// Whether a definition, bound singleton or parent entry exists under
    /// `name` (alias chains resolved)
    pub fn contains(&self, name: &str) -> bool {
        let canonical = self.registry.canonical_name(name);
        self.registry.contains(&canonical)
            || self.singletons.contains(&canonical)
            || self
                .parent
                .as_ref()
                .map(|p| p.contains(&canonical))
                .unwrap_or(false)
    }

    /// Whether `name` resolves to a shared singleton
    pub fn is_singleton(&self, name: &str) -> bool {
        let canonical = self.registry.canonical_name(name);
        if self.registry.contains(&canonical) {
            return merged_definition(&self.registry, &canonical)
                .map(|d| d.scope().is_singleton())
                .unwrap_or(false);
        }
        if self.singletons.contains(&canonical) {
            return true;
        }
        self.parent
            .as_ref()
            .map(|p| p.is_singleton(&canonical))
            .unwrap_or(false)
    }

    /// Locally registered definition names in registration order
    pub fn definition_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn is_frozen(&self) -> bool {
        self.registry.is_frozen()
    }

    // --- lifecycle ---

    /// Eagerly create every non-lazy singleton, in registration order
    pub fn initialize_singletons(&self) -> Result<(), ContainerError> {
        for name in self.registry.names() {
            let merged = merged_definition(&self.registry, &name)?;
            if merged.is_template() || merged.is_lazy() || !merged.scope().is_singleton() {
                continue;
            }
            debug!(service = name.as_str(), "eager singleton initialization");
            self.lookup(&name)?;
        }
        Ok(())
    }

    /// Dispose all tracked singletons (newest first) and drop the singleton
    /// cache; destruction failures are collected, not propagated
    pub fn shutdown(&self) -> Result<Vec<DisposalFailure>, ContainerError> {
        debug!("shutting down container");
        let failures = self.disposals.dispose_all();
        self.singletons.clear()?;
        Ok(failures)
    }

    // --- creation paths ---

    fn create_singleton(
        &self,
        name: &str,
        definition: &ServiceDefinition,
    ) -> Result<Option<ServiceHandle>, ContainerError> {
        self.singletons.get_or_create(name, || {
            debug!(service = name, "creating singleton");
            let Some(instance) = create_instance(self, name, definition)? else {
                return Ok(None);
            };
            // visible to re-entrant requests from this thread during
            // property population, closing singleton reference cycles
            self.singletons.publish_early(name, instance.clone())?;
            populate_properties(self, name, definition, &instance)?;
            initialize(name, definition, &instance)?;
            if !definition.destroyers().is_empty() {
                self.disposals
                    .register(name, instance.clone(), definition.destroyers().to_vec())?;
            }
            Ok(Some(instance))
        })
    }

    fn create_prototype(
        &self,
        name: &str,
        definition: &ServiceDefinition,
    ) -> Result<Option<ServiceHandle>, ContainerError> {
        let cycle = PROTOTYPES_IN_CREATION.with(|stack| {
            let stack = stack.borrow();
            stack.iter().any(|n| n == name).then(|| {
                let mut path = stack.clone();
                path.push(name.to_string());
                path.join(" -> ")
            })
        });
        if let Some(path) = cycle {
            return Err(ContainerError::circular_reference(name, path));
        }

        debug!(service = name, "creating prototype");
        PROTOTYPES_IN_CREATION.with(|stack| stack.borrow_mut().push(name.to_string()));
        let result = self.build_instance(name, definition);
        PROTOTYPES_IN_CREATION.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(index) = stack.iter().rposition(|n| n == name) {
                stack.remove(index);
            }
        });
        result
    }

    fn scoped_instance(
        &self,
        name: &str,
        scope: &str,
        definition: &ServiceDefinition,
    ) -> Result<ServiceHandle, ContainerError> {
        let handler = self.scope_handler(scope).ok_or_else(|| {
            ContainerError::UnknownScope {
                service: name.to_string(),
                scope: scope.to_string(),
            }
        })?;
        let mut create = || {
            self.build_instance(name, definition)?.ok_or_else(|| {
                ContainerError::service_creation(name, "factory produced no instance")
            })
        };
        handler.get(name, &mut create)
    }

    /// Full pipeline without singleton bookkeeping, shared by the prototype
    /// and custom-scope paths
    fn build_instance(
        &self,
        name: &str,
        definition: &ServiceDefinition,
    ) -> Result<Option<ServiceHandle>, ContainerError> {
        let Some(instance) = create_instance(self, name, definition)? else {
            return Ok(None);
        };
        populate_properties(self, name, definition, &instance)?;
        initialize(name, definition, &instance)?;
        Ok(Some(instance))
    }

    fn scope_handler(&self, scope: &str) -> Option<Arc<dyn CustomScope>> {
        if let Ok(scopes) = self.scopes.read() {
            if let Some(handler) = scopes.get(scope) {
                return Some(handler.clone());
            }
        }
        self.parent.as_ref().and_then(|p| p.scope_handler(scope))
    }

    // --- type-based candidate collection ---

    /// All autowirable registrations matching `target` by exact type:
    /// local definitions, manually bound singletons (by runtime type),
    /// then parent candidates not shadowed by a local name.
    fn collect_candidates(&self, target: TypeId) -> Result<Vec<Candidate>, ContainerError> {
        let mut candidates = Vec::new();
        for name in self.registry.names() {
            let merged = merged_definition(&self.registry, &name)?;
            if merged.is_template() || !merged.is_autowire_candidate() {
                continue;
            }
            if merged.type_id() == Some(target) {
                candidates.push(Candidate {
                    name,
                    primary: merged.is_primary(),
                    priority: merged.priority(),
                    qualifier: merged.qualifier().map(str::to_string),
                });
            }
        }
        for (name, handle) in self.singletons.manual_entries()? {
            if candidates.iter().any(|c| c.name == name) {
                continue;
            }
            if (*handle).type_id() == target {
                candidates.push(Candidate {
                    name,
                    primary: false,
                    priority: None,
                    qualifier: None,
                });
            }
        }
        if let Some(parent) = &self.parent {
            for candidate in parent.collect_candidates(target)? {
                if !candidates.iter().any(|c| c.name == candidate.name)
                    && !self.registry.contains(&candidate.name)
                {
                    candidates.push(candidate);
                }
            }
        }
        Ok(candidates)
    }

    // --- depends-on bookkeeping ---

    fn record_dependent(&self, name: &str, dependent: &str) -> Result<(), ContainerError> {
        self.dependents
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("dependents"))?
            .entry(name.to_string())
            .or_default()
            .insert(dependent.to_string());
        Ok(())
    }

    /// Whether `candidate` transitively depends on `name`
    fn has_transitive_dependent(
        &self,
        name: &str,
        candidate: &str,
    ) -> Result<bool, ContainerError> {
        let dependents = self
            .dependents
            .lock()
            .map_err(|_| ContainerError::lock_poisoned("dependents"))?;
        let mut queue = vec![name.to_string()];
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(current) = queue.pop() {
            if let Some(direct) = dependents.get(&current) {
                for dependent in direct {
                    if dependent == candidate {
                        return Ok(true);
                    }
                    if seen.insert(dependent.clone()) {
                        queue.push(dependent.clone());
                    }
                }
            }
        }
        Ok(false)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.registry.names().len())
            .field("frozen", &self.is_frozen())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
