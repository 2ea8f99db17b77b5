use std::sync::Arc;

use tracing::debug;

use crate::container::definition::{
    ConstructorArg, PropertyValue, ResolvedArgs, ServiceActivation, ServiceDefinition,
};
use crate::container::factory::Container;
use crate::container::scope::ServiceHandle;
use crate::errors::ContainerError;

/// Instantiate a service from its merged definition: resolve constructor
/// arguments, then run the factory or factory method.
///
/// Returns `Ok(None)` when the factory legitimately produced no instance.
pub(crate) fn create_instance(
    container: &Container,
    name: &str,
    definition: &ServiceDefinition,
) -> Result<Option<ServiceHandle>, ContainerError> {
    if definition.is_template() {
        return Err(ContainerError::service_creation(
            name,
            "definition is an abstract template and cannot be instantiated",
        ));
    }
    let activation = definition.activation().ok_or_else(|| {
        ContainerError::service_creation(name, "definition declares no factory")
    })?;

    let args = resolve_constructor_args(container, name, definition)?;

    let produced = match activation {
        ServiceActivation::Factory(factory) => factory(&args).map_err(|err| match err {
            // creation-path errors keep their identity; anything else is
            // wrapped so the failing service is named
            err @ ContainerError::CircularReference { .. }
            | err @ ContainerError::UnsatisfiedDependency { .. } => err,
            err => ContainerError::service_creation_with_source(name, "factory failed", err),
        })?,
        ServiceActivation::FactoryMethod {
            factory_service,
            method,
        } => {
            let owner = container.get(factory_service).map_err(|err| {
                ContainerError::unsatisfied_dependency(
                    name,
                    format!("factory service '{factory_service}'"),
                    err,
                )
            })?;
            method(&owner, &args).map_err(|err| {
                ContainerError::service_creation_with_source(
                    name,
                    format!("factory method on '{factory_service}' failed"),
                    err,
                )
            })?
        }
    };

    Ok(produced.map(|boxed| Arc::from(boxed) as ServiceHandle))
}

fn resolve_constructor_args(
    container: &Container,
    name: &str,
    definition: &ServiceDefinition,
) -> Result<ResolvedArgs, ContainerError> {
    let mut values = Vec::with_capacity(definition.constructor_args().len());
    for (index, arg) in definition.constructor_args().iter().enumerate() {
        let value = match arg {
            ConstructorArg::Value(handle) => Some(handle.clone()),
            ConstructorArg::Ref(target) => Some(container.get(target).map_err(|err| {
                ContainerError::unsatisfied_dependency(
                    name,
                    format!("constructor argument #{index} (ref '{target}')"),
                    err,
                )
            })?),
            ConstructorArg::Autowired(descriptor) => {
                container.resolve_with(descriptor).map_err(|err| match err {
                    err @ ContainerError::CircularReference { .. } => err,
                    err => ContainerError::unsatisfied_dependency(
                        name,
                        format!(
                            "constructor argument #{index} (type {})",
                            descriptor.type_name()
                        ),
                        err,
                    ),
                })?
            }
        };
        values.push(value);
    }
    Ok(ResolvedArgs::new(values))
}

/// Apply the definition's property assignments to an allocated instance.
///
/// For singletons this runs after the early reference is published, which is
/// what lets singleton reference cycles close.
pub(crate) fn populate_properties(
    container: &Container,
    name: &str,
    definition: &ServiceDefinition,
    instance: &ServiceHandle,
) -> Result<(), ContainerError> {
    for property in definition.properties() {
        let value = match property.value_source() {
            PropertyValue::Literal(handle) => Some(handle.clone()),
            PropertyValue::Ref(target) => Some(container.get(target).map_err(|err| {
                match err {
                    err @ ContainerError::CircularReference { .. } => err,
                    err => ContainerError::unsatisfied_dependency(
                        name,
                        format!("property '{}' (ref '{target}')", property.name()),
                        err,
                    ),
                }
            })?),
            PropertyValue::Autowired(descriptor) => {
                container.resolve_with(descriptor).map_err(|err| match err {
                    err @ ContainerError::CircularReference { .. } => err,
                    err => ContainerError::unsatisfied_dependency(
                        name,
                        format!(
                            "property '{}' (type {})",
                            property.name(),
                            descriptor.type_name()
                        ),
                        err,
                    ),
                })?
            }
        };
        // an optional autowired property that found no candidate is skipped
        if let Some(value) = value {
            property.apply(instance, value).map_err(|err| {
                ContainerError::unsatisfied_dependency(
                    name,
                    format!("property '{}'", property.name()),
                    err,
                )
            })?;
        }
    }
    Ok(())
}

/// Run init callbacks in declaration order; duplicates were collapsed when
/// the definition was built or merged.
pub(crate) fn initialize(
    name: &str,
    definition: &ServiceDefinition,
    instance: &ServiceHandle,
) -> Result<(), ContainerError> {
    for callback in definition.initializers() {
        debug!(service = name, callback = callback.name(), "running init callback");
        callback.invoke(instance.as_ref()).map_err(|err| {
            ContainerError::service_creation_with_source(
                name,
                format!("init callback '{}' failed", callback.name()),
                err,
            )
        })?;
    }
    Ok(())
}
