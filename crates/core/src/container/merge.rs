use std::sync::Arc;

use crate::container::definition::{dedupe_callbacks, LifecycleCallback, ServiceDefinition};
use crate::container::registry::DefinitionRegistry;
use crate::errors::ContainerError;

/// Resolve a definition's parent chain into one effective definition.
///
/// Results are cached in the registry; the cache is dropped wholesale on any
/// structural registry change, so a stale merge is never observed.
pub(crate) fn merged_definition(
    registry: &DefinitionRegistry,
    name: &str,
) -> Result<Arc<ServiceDefinition>, ContainerError> {
    if let Some(cached) = registry.cached_merged(name) {
        return Ok(cached);
    }
    let merged = Arc::new(merge_chain(registry, name, &mut Vec::new())?);
    registry.cache_merged(name, merged.clone())?;
    Ok(merged)
}

fn merge_chain(
    registry: &DefinitionRegistry,
    name: &str,
    visiting: &mut Vec<String>,
) -> Result<ServiceDefinition, ContainerError> {
    if visiting.iter().any(|n| n == name) {
        visiting.push(name.to_string());
        return Err(ContainerError::illegal_state(format!(
            "definition parent chain forms a cycle: {}",
            visiting.join(" -> ")
        )));
    }
    let definition = registry
        .get(name)
        .ok_or_else(|| ContainerError::no_such_definition(name))?;

    let parent = match definition.parent_name() {
        None => return Ok((*definition).clone()),
        Some(parent) => registry.canonical_name(parent),
    };

    visiting.push(name.to_string());
    let base = merge_chain(registry, &parent, visiting)?;
    visiting.pop();

    Ok(apply_overrides(base, &definition))
}

/// Overlay a child definition onto its merged parent: fields the child sets
/// win, properties merge by name, callback lists concatenate with duplicate
/// names collapsed.
fn apply_overrides(mut base: ServiceDefinition, child: &ServiceDefinition) -> ServiceDefinition {
    if child.type_id.is_some() {
        base.type_id = child.type_id;
        base.type_name = child.type_name;
    }
    if child.scope.is_some() {
        base.scope = child.scope.clone();
    }
    if child.activation.is_some() {
        base.activation = child.activation.clone();
        base.constructor_args = child.constructor_args.clone();
    } else if !child.constructor_args.is_empty() {
        base.constructor_args = child.constructor_args.clone();
    }

    for property in &child.properties {
        match base
            .properties
            .iter()
            .position(|p| p.name() == property.name())
        {
            Some(index) => base.properties[index] = property.clone(),
            None => base.properties.push(property.clone()),
        }
    }

    merge_callbacks(&mut base.initializers, &child.initializers);
    merge_callbacks(&mut base.destroyers, &child.destroyers);

    if child.lazy_init.is_some() {
        base.lazy_init = child.lazy_init;
    }
    base.primary = base.primary || child.primary;
    if child.priority.is_some() {
        base.priority = child.priority;
    }
    if child.qualifier.is_some() {
        base.qualifier = child.qualifier.clone();
    }
    base.autowire_candidate = base.autowire_candidate && child.autowire_candidate;
    for dep in &child.depends_on {
        if !base.depends_on.contains(dep) {
            base.depends_on.push(dep.clone());
        }
    }
    base.template = child.template;
    base.parent = None;
    base
}

/// Inherited callbacks run first; a child callback reusing a parent's name
/// replaces the parent's closure at the parent's position.
fn merge_callbacks(base: &mut Vec<LifecycleCallback>, extra: &[LifecycleCallback]) {
    for callback in extra {
        match base.iter().position(|c| c.name() == callback.name()) {
            Some(index) => base[index] = callback.clone(),
            None => base.push(callback.clone()),
        }
    }
    dedupe_callbacks(base);
}
