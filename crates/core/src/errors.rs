use thiserror::Error;

/// Error type for every container operation.
///
/// All failures are synchronous and surfaced to the immediate caller; nothing
/// is retried internally. Apart from `SingletonAlreadyBound`, a failed
/// operation leaves the container in a state where the same request can be
/// retried after the configuration has been fixed.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no service definition registered under name '{name}'")]
    NoSuchDefinition { name: String },

    #[error("no service of type '{required_type}' available for injection")]
    NoMatchingService { required_type: String },

    #[error("no unique service of type '{required_type}', candidates: [{}]", .candidates.join(", "))]
    NoUniqueService {
        required_type: String,
        candidates: Vec<String>,
    },

    #[error("multiple services of type '{required_type}' are marked primary: [{}]", .candidates.join(", "))]
    MultiplePrimary {
        required_type: String,
        candidates: Vec<String>,
    },

    #[error("multiple services of type '{required_type}' share the lowest priority {priority}: [{}]", .candidates.join(", "))]
    MultipleSamePriority {
        required_type: String,
        priority: i32,
        candidates: Vec<String>,
    },

    #[error("unsatisfied dependency of service '{service}' at {member}: {source}")]
    UnsatisfiedDependency {
        service: String,
        member: String,
        source: Box<ContainerError>,
    },

    #[error("circular reference while creating service '{service}' (path: {path})")]
    CircularReference { service: String, path: String },

    #[error("definition override for '{name}' is not allowed (existing: {existing}, incoming: {incoming})")]
    DefinitionOverrideRejected {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("alias '{alias}' for '{name}' would close an alias cycle")]
    AliasCycle { name: String, alias: String },

    #[error("scope '{scope}' of service '{service}' is not registered with the container")]
    UnknownScope { service: String, scope: String },

    #[error("a singleton object is already bound under name '{name}'")]
    SingletonAlreadyBound { name: String },

    #[error("definitions are frozen; cannot modify '{name}'")]
    RegistryFrozen { name: String },

    #[error("error creating service '{service}': {message}")]
    ServiceCreation {
        service: String,
        message: String,
        source: Option<Box<ContainerError>>,
    },

    #[error("service '{service}' is not of the requested type {expected}")]
    TypeMismatch {
        service: String,
        expected: &'static str,
    },

    #[error("illegal container state: {message}")]
    IllegalState { message: String },

    #[error("lock poisoned on resource: {resource}")]
    LockPoisoned { resource: String },
}

impl ContainerError {
    /// Create a new not-found error for a service name
    pub fn no_such_definition(name: impl Into<String>) -> Self {
        Self::NoSuchDefinition { name: name.into() }
    }

    /// Create a new circular-reference error
    pub fn circular_reference(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self::CircularReference {
            service: service.into(),
            path: path.into(),
        }
    }

    /// Create a new unsatisfied-dependency error naming the injection point
    pub fn unsatisfied_dependency(
        service: impl Into<String>,
        member: impl Into<String>,
        source: ContainerError,
    ) -> Self {
        Self::UnsatisfiedDependency {
            service: service.into(),
            member: member.into(),
            source: Box::new(source),
        }
    }

    /// Create a new creation error
    pub fn service_creation(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceCreation {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a new creation error with an underlying cause
    pub fn service_creation_with_source(
        service: impl Into<String>,
        message: impl Into<String>,
        source: ContainerError,
    ) -> Self {
        Self::ServiceCreation {
            service: service.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new illegal-state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create a new lock-poisoned error
    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }

    /// Check if the error is a not-found error (by name or by type)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoSuchDefinition { .. } | Self::NoMatchingService { .. }
        )
    }

    /// Check if the error is an ambiguous-resolution error
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::NoUniqueService { .. }
                | Self::MultiplePrimary { .. }
                | Self::MultipleSamePriority { .. }
        )
    }

    /// Check if the error is a circular-reference error
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularReference { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_candidates() {
        let err = ContainerError::NoUniqueService {
            required_type: "Repo".to_string(),
            candidates: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Repo"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ContainerError::no_such_definition("x").is_not_found());
        assert!(ContainerError::circular_reference("x", "x -> y -> x").is_circular());
        assert!(ContainerError::MultiplePrimary {
            required_type: "T".to_string(),
            candidates: vec![],
        }
        .is_ambiguous());
    }

    #[test]
    fn test_same_priority_error_carries_value() {
        let err = ContainerError::MultipleSamePriority {
            required_type: "T".to_string(),
            priority: 7,
            candidates: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains('7'));
    }
}
