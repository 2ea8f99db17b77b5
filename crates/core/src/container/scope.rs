use std::any::Any;
use std::sync::Arc;

use crate::errors::ContainerError;

/// Type-erased handle to a container-managed instance
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Service scope enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceScope {
    /// Single instance created lazily and cached for the container's lifetime
    Singleton,
    /// New instance created on every request, never cached
    Prototype,
    /// Instance lifetime delegated to a named scope strategy registered
    /// with the container
    Custom(String),
}

impl ServiceScope {
    /// Check if the scope is singleton
    pub fn is_singleton(&self) -> bool {
        matches!(self, ServiceScope::Singleton)
    }

    /// Check if the scope is prototype
    pub fn is_prototype(&self) -> bool {
        matches!(self, ServiceScope::Prototype)
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &str {
        match self {
            ServiceScope::Singleton => "singleton",
            ServiceScope::Prototype => "prototype",
            ServiceScope::Custom(name) => name.as_str(),
        }
    }
}

impl Default for ServiceScope {
    fn default() -> Self {
        ServiceScope::Singleton
    }
}

impl std::fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServiceScope {
    type Err = std::convert::Infallible;

    /// Unknown names parse into `Custom`; whether such a scope actually
    /// exists is checked at first resolution, not here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(ServiceScope::Singleton),
            "prototype" => Ok(ServiceScope::Prototype),
            other => Ok(ServiceScope::Custom(other.to_string())),
        }
    }
}

/// Strategy for a custom-named scope.
///
/// The container delegates caching decisions for `ServiceScope::Custom`
/// services to the registered strategy: `get` either returns an instance it
/// holds for `name` or invokes `create` and decides whether to retain the
/// result.
pub trait CustomScope: Send + Sync {
    /// Return the instance held under `name`, creating it on demand
    fn get(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<ServiceHandle, ContainerError>,
    ) -> Result<ServiceHandle, ContainerError>;

    /// Drop the instance held under `name`, returning it if present
    fn remove(&self, name: &str) -> Option<ServiceHandle>;
}
