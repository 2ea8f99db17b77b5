use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::container::lifecycle::{Disposable, Initializable};
use crate::container::resolver::DependencyDescriptor;
use crate::container::scope::{ServiceScope, ServiceHandle};
use crate::errors::ContainerError;

/// Factory closure invoked with resolved constructor arguments.
///
/// A factory may legitimately produce no instance (an optional provider);
/// such a definition still participates in type matching via its declared
/// type.
pub type FactoryFn = Arc<
    dyn Fn(&ResolvedArgs) -> Result<Option<Box<dyn Any + Send + Sync>>, ContainerError>
        + Send
        + Sync,
>;

/// Factory-method closure invoked on another managed service
pub type FactoryMethodFn = Arc<
    dyn Fn(&ServiceHandle, &ResolvedArgs) -> Result<Option<Box<dyn Any + Send + Sync>>, ContainerError>
        + Send
        + Sync,
>;

pub(crate) type ApplyFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), ServiceHandle) -> Result<(), ContainerError> + Send + Sync>;

pub(crate) type CallbackFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), ContainerError> + Send + Sync>;

/// Constructor arguments after the container has resolved them, in
/// declaration order. Optional autowired arguments that found no candidate
/// occupy their slot as vacant.
pub struct ResolvedArgs {
    values: Vec<Option<ServiceHandle>>,
}

impl ResolvedArgs {
    pub(crate) fn new(values: Vec<Option<ServiceHandle>>) -> Self {
        Self { values }
    }

    /// Create an empty argument list (for factories that take none)
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the argument at `index` downcast to its declared type
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, ContainerError> {
        match self.values.get(index) {
            Some(Some(handle)) => handle.clone().downcast::<T>().map_err(|_| {
                ContainerError::illegal_state(format!(
                    "constructor argument #{index} is not of type {}",
                    std::any::type_name::<T>()
                ))
            }),
            Some(None) => Err(ContainerError::illegal_state(format!(
                "constructor argument #{index} was declared optional and is absent"
            ))),
            None => Err(ContainerError::illegal_state(format!(
                "constructor argument #{index} was never declared"
            ))),
        }
    }

    /// Get an optional argument, `None` when the dependency was absent
    pub fn get_optional<T: Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.values.get(index) {
            Some(Some(_)) => self.get::<T>(index).map(Some),
            Some(None) => Ok(None),
            None => Err(ContainerError::illegal_state(format!(
                "constructor argument #{index} was never declared"
            ))),
        }
    }
}

/// Strategy for producing a raw service instance
#[derive(Clone)]
pub enum ServiceActivation {
    /// Direct factory closure bound at registration time
    Factory(FactoryFn),
    /// Named method on another managed service
    FactoryMethod {
        factory_service: String,
        method: FactoryMethodFn,
    },
}

impl std::fmt::Debug for ServiceActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceActivation::Factory(_) => write!(f, "Factory(<factory_fn>)"),
            ServiceActivation::FactoryMethod { factory_service, .. } => {
                write!(f, "FactoryMethod(on '{}')", factory_service)
            }
        }
    }
}

/// A constructor argument binding
#[derive(Clone)]
pub enum ConstructorArg {
    /// Literal value supplied at registration
    Value(ServiceHandle),
    /// Explicit reference to another service by name
    Ref(String),
    /// Resolved through the dependency resolver by type
    Autowired(DependencyDescriptor),
}

impl ConstructorArg {
    /// Bind a literal value
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        ConstructorArg::Value(Arc::new(value))
    }

    /// Bind a reference to a named service
    pub fn reference(name: impl Into<String>) -> Self {
        ConstructorArg::Ref(name.into())
    }

    /// Bind by type through the dependency resolver
    pub fn autowired<T: 'static>() -> Self {
        ConstructorArg::Autowired(DependencyDescriptor::of::<T>())
    }

    /// Bind through an explicit dependency descriptor
    pub fn autowired_with(descriptor: DependencyDescriptor) -> Self {
        ConstructorArg::Autowired(descriptor)
    }
}

impl std::fmt::Debug for ConstructorArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstructorArg::Value(_) => write!(f, "Value(<literal>)"),
            ConstructorArg::Ref(name) => write!(f, "Ref({})", name),
            ConstructorArg::Autowired(d) => write!(f, "Autowired({})", d.type_name()),
        }
    }
}

/// Value source for a property assignment
#[derive(Clone)]
pub enum PropertyValue {
    /// Literal value supplied at registration
    Literal(ServiceHandle),
    /// Explicit reference to another service by name
    Ref(String),
    /// Resolved through the dependency resolver by type
    Autowired(DependencyDescriptor),
}

impl std::fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Literal(_) => write!(f, "Literal(<value>)"),
            PropertyValue::Ref(name) => write!(f, "Ref({})", name),
            PropertyValue::Autowired(d) => write!(f, "Autowired({})", d.type_name()),
        }
    }
}

/// A named property assignment applied after instantiation.
///
/// The apply closure is bound at registration time and performs the
/// downcasts; the target type uses interior mutability for the assigned
/// field.
#[derive(Clone)]
pub struct PropertySpec {
    name: String,
    value: PropertyValue,
    apply: ApplyFn,
}

impl PropertySpec {
    /// Assign a literal value through a typed setter
    pub fn value<S, V, F>(name: impl Into<String>, value: V, set: F) -> Self
    where
        S: Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(&S, V) + Send + Sync + 'static,
    {
        let name = name.into();
        let member = name.clone();
        let apply: ApplyFn = Arc::new(move |target, injected| {
            let target = target.downcast_ref::<S>().ok_or_else(|| {
                ContainerError::illegal_state(format!(
                    "property '{member}' setter target is not of type {}",
                    std::any::type_name::<S>()
                ))
            })?;
            let value = injected.downcast_ref::<V>().cloned().ok_or_else(|| {
                ContainerError::illegal_state(format!(
                    "property '{member}' value is not of type {}",
                    std::any::type_name::<V>()
                ))
            })?;
            set(target, value);
            Ok(())
        });
        Self {
            name,
            value: PropertyValue::Literal(Arc::new(value)),
            apply,
        }
    }

    /// Assign a reference to the named service through a typed setter
    pub fn reference<S, D, F>(name: impl Into<String>, target: impl Into<String>, set: F) -> Self
    where
        S: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&S, Arc<D>) + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            apply: Self::injecting_apply::<S, D, F>(&name, set),
            name,
            value: PropertyValue::Ref(target.into()),
        }
    }

    /// Assign a dependency resolved by type through a typed setter
    pub fn autowired<S, D, F>(name: impl Into<String>, set: F) -> Self
    where
        S: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&S, Arc<D>) + Send + Sync + 'static,
    {
        Self::autowired_with(name, DependencyDescriptor::of::<D>(), set)
    }

    /// Assign a dependency resolved through an explicit descriptor
    pub fn autowired_with<S, D, F>(
        name: impl Into<String>,
        descriptor: DependencyDescriptor,
        set: F,
    ) -> Self
    where
        S: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&S, Arc<D>) + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            apply: Self::injecting_apply::<S, D, F>(&name, set),
            name,
            value: PropertyValue::Autowired(descriptor),
        }
    }

    fn injecting_apply<S, D, F>(name: &str, set: F) -> ApplyFn
    where
        S: Send + Sync + 'static,
        D: Send + Sync + 'static,
        F: Fn(&S, Arc<D>) + Send + Sync + 'static,
    {
        let member = name.to_string();
        Arc::new(move |target, injected| {
            let target = target.downcast_ref::<S>().ok_or_else(|| {
                ContainerError::illegal_state(format!(
                    "property '{member}' setter target is not of type {}",
                    std::any::type_name::<S>()
                ))
            })?;
            let dependency = injected.downcast::<D>().map_err(|_| {
                ContainerError::illegal_state(format!(
                    "property '{member}' dependency is not of type {}",
                    std::any::type_name::<D>()
                ))
            })?;
            set(target, dependency);
            Ok(())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_source(&self) -> &PropertyValue {
        &self.value
    }

    pub(crate) fn apply(
        &self,
        target: &ServiceHandle,
        value: ServiceHandle,
    ) -> Result<(), ContainerError> {
        (self.apply)(target.as_ref(), value)
    }
}

impl std::fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}

/// A named initialization or destruction callback.
///
/// Names exist so that inherited/duplicate callbacks collapse to a single
/// invocation when definitions are merged.
#[derive(Clone)]
pub struct LifecycleCallback {
    name: String,
    invoke: CallbackFn,
}

impl LifecycleCallback {
    pub fn new<S, F>(name: impl Into<String>, f: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S) -> Result<(), ContainerError> + Send + Sync + 'static,
    {
        let name = name.into();
        let callback = name.clone();
        let invoke: CallbackFn = Arc::new(move |target| {
            let target = target.downcast_ref::<S>().ok_or_else(|| {
                ContainerError::illegal_state(format!(
                    "callback '{callback}' target is not of type {}",
                    std::any::type_name::<S>()
                ))
            })?;
            f(target)
        });
        Self { name, invoke }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, target: &(dyn Any + Send + Sync)) -> Result<(), ContainerError> {
        (self.invoke)(target)
    }
}

impl std::fmt::Debug for LifecycleCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LifecycleCallback({})", self.name)
    }
}

/// Metadata describing how to construct and configure one service.
///
/// Definitions are registered under a unique name; closures are shared so a
/// definition clones cheaply when merged with a parent template.
#[derive(Clone)]
pub struct ServiceDefinition {
    pub(crate) type_id: Option<TypeId>,
    pub(crate) type_name: Option<&'static str>,
    pub(crate) scope: Option<ServiceScope>,
    pub(crate) activation: Option<ServiceActivation>,
    pub(crate) constructor_args: Vec<ConstructorArg>,
    pub(crate) properties: Vec<PropertySpec>,
    pub(crate) initializers: Vec<LifecycleCallback>,
    pub(crate) destroyers: Vec<LifecycleCallback>,
    pub(crate) lazy_init: Option<bool>,
    pub(crate) primary: bool,
    pub(crate) priority: Option<i32>,
    pub(crate) qualifier: Option<String>,
    pub(crate) autowire_candidate: bool,
    pub(crate) depends_on: Vec<String>,
    pub(crate) parent: Option<String>,
    pub(crate) template: bool,
}

impl ServiceDefinition {
    /// Start building a definition for a concrete type
    pub fn for_type<T: Send + Sync + 'static>() -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            definition: ServiceDefinition {
                type_id: Some(TypeId::of::<T>()),
                type_name: Some(std::any::type_name::<T>()),
                ..ServiceDefinition::blank()
            },
        }
    }

    /// Start building an abstract template: holds shared configuration for
    /// child definitions and is never instantiated itself
    pub fn template() -> ServiceDefinitionBuilder {
        ServiceDefinitionBuilder {
            definition: ServiceDefinition {
                template: true,
                ..ServiceDefinition::blank()
            },
        }
    }

    fn blank() -> Self {
        Self {
            type_id: None,
            type_name: None,
            scope: None,
            activation: None,
            constructor_args: Vec::new(),
            properties: Vec::new(),
            initializers: Vec::new(),
            destroyers: Vec::new(),
            lazy_init: None,
            primary: false,
            priority: None,
            qualifier: None,
            autowire_candidate: true,
            depends_on: Vec::new(),
            parent: None,
            template: false,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }

    /// Effective scope, defaulting to singleton when unset
    pub fn scope(&self) -> ServiceScope {
        self.scope.clone().unwrap_or_default()
    }

    pub fn activation(&self) -> Option<&ServiceActivation> {
        self.activation.as_ref()
    }

    pub fn constructor_args(&self) -> &[ConstructorArg] {
        &self.constructor_args
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn initializers(&self) -> &[LifecycleCallback] {
        &self.initializers
    }

    pub fn destroyers(&self) -> &[LifecycleCallback] {
        &self.destroyers
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_init.unwrap_or(false)
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_autowire_candidate(&self) -> bool {
        self.autowire_candidate
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_template(&self) -> bool {
        self.template
    }

    /// One-line description for diagnostics
    pub fn description(&self) -> String {
        format!(
            "ServiceDefinition(type={}, scope={})",
            self.type_name.unwrap_or("<template>"),
            self.scope()
        )
    }
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("activation", &self.activation)
            .field("constructor_args", &self.constructor_args.len())
            .field("properties", &self.properties.len())
            .field("lazy_init", &self.lazy_init)
            .field("primary", &self.primary)
            .field("priority", &self.priority)
            .field("qualifier", &self.qualifier)
            .field("autowire_candidate", &self.autowire_candidate)
            .field("depends_on", &self.depends_on)
            .field("parent", &self.parent)
            .field("template", &self.template)
            .finish()
    }
}

/// Builder for service definitions
pub struct ServiceDefinitionBuilder {
    definition: ServiceDefinition,
}

impl ServiceDefinitionBuilder {
    /// Set the service scope
    pub fn with_scope(mut self, scope: ServiceScope) -> Self {
        self.definition.scope = Some(scope);
        self
    }

    /// Shorthand for `with_scope(ServiceScope::Prototype)`
    pub fn prototype(self) -> Self {
        self.with_scope(ServiceScope::Prototype)
    }

    /// Shorthand for a custom-named scope
    pub fn in_scope(self, scope: impl Into<String>) -> Self {
        self.with_scope(ServiceScope::Custom(scope.into()))
    }

    /// Set a factory producing the instance from resolved constructor args
    pub fn with_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedArgs) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let wrapped: FactoryFn = Arc::new(move |args| {
            factory(args).map(|v| Some(Box::new(v) as Box<dyn Any + Send + Sync>))
        });
        self.definition.activation = Some(ServiceActivation::Factory(wrapped));
        self
    }

    /// Set a factory that may legitimately produce no instance
    pub fn with_optional_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedArgs) -> Result<Option<T>, ContainerError> + Send + Sync + 'static,
    {
        let wrapped: FactoryFn = Arc::new(move |args| {
            factory(args).map(|v| v.map(|v| Box::new(v) as Box<dyn Any + Send + Sync>))
        });
        self.definition.activation = Some(ServiceActivation::Factory(wrapped));
        self
    }

    /// Set a factory method invoked on another managed service
    pub fn with_factory_method<O, T, F>(mut self, factory_service: impl Into<String>, method: F) -> Self
    where
        O: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: Fn(&O, &ResolvedArgs) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let factory_service = factory_service.into();
        let owner_name = factory_service.clone();
        let wrapped: FactoryMethodFn = Arc::new(move |owner, args| {
            let owner = owner.clone().downcast::<O>().map_err(|_| {
                ContainerError::illegal_state(format!(
                    "factory service '{owner_name}' is not of type {}",
                    std::any::type_name::<O>()
                ))
            })?;
            method(&owner, args).map(|v| Some(Box::new(v) as Box<dyn Any + Send + Sync>))
        });
        self.definition.activation = Some(ServiceActivation::FactoryMethod {
            factory_service,
            method: wrapped,
        });
        self
    }

    /// Append a constructor argument binding (positional)
    pub fn with_constructor_arg(mut self, arg: ConstructorArg) -> Self {
        self.definition.constructor_args.push(arg);
        self
    }

    /// Append a property assignment
    pub fn with_property(mut self, property: PropertySpec) -> Self {
        self.definition.properties.push(property);
        self
    }

    /// Append a named init callback, run after property population
    pub fn with_initializer(mut self, callback: LifecycleCallback) -> Self {
        self.definition.initializers.push(callback);
        self
    }

    /// Append a named destroy callback, run at container shutdown
    pub fn with_destroyer(mut self, callback: LifecycleCallback) -> Self {
        self.definition.destroyers.push(callback);
        self
    }

    /// Hook the `Initializable` contract; runs before any named init callback
    pub fn initializable<T: Initializable + 'static>(mut self) -> Self {
        self.definition.initializers.insert(
            0,
            LifecycleCallback::new("initialize", |service: &T| service.initialize()),
        );
        self
    }

    /// Hook the `Disposable` contract; runs before any named destroy callback
    pub fn disposable<T: Disposable + 'static>(mut self) -> Self {
        self.definition.destroyers.insert(
            0,
            LifecycleCallback::new("dispose", |service: &T| service.dispose()),
        );
        self
    }

    /// Defer singleton creation until first request, skipping eager
    /// initialization
    pub fn lazy(mut self) -> Self {
        self.definition.lazy_init = Some(true);
        self
    }

    /// Prefer this definition when type resolution is ambiguous
    pub fn primary(mut self) -> Self {
        self.definition.primary = true;
        self
    }

    /// Tie-break value for type resolution; lower wins
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.definition.priority = Some(priority);
        self
    }

    /// Qualifier matched against dependency hints
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.definition.qualifier = Some(qualifier.into());
        self
    }

    /// Include or exclude this definition from type-based autowiring
    pub fn autowire_candidate(mut self, candidate: bool) -> Self {
        self.definition.autowire_candidate = candidate;
        self
    }

    /// Require the named service to be fully created before this one
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.definition.depends_on.push(name.into());
        self
    }

    /// Inherit configuration from a parent definition
    pub fn with_parent(mut self, name: impl Into<String>) -> Self {
        self.definition.parent = Some(name.into());
        self
    }

    /// Finish the definition, collapsing duplicate callback names
    pub fn build(mut self) -> ServiceDefinition {
        dedupe_callbacks(&mut self.definition.initializers);
        dedupe_callbacks(&mut self.definition.destroyers);
        self.definition
    }
}

/// Collapse duplicate callback names, keeping the first occurrence
pub(crate) fn dedupe_callbacks(callbacks: &mut Vec<LifecycleCallback>) {
    let mut seen = std::collections::HashSet::new();
    callbacks.retain(|cb| seen.insert(cb.name().to_string()));
}
