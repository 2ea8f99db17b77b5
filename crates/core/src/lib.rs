pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use container::{
    ConstructorArg, Container, CustomScope, DependencyDescriptor, Disposable, DisposalFailure,
    Initializable, LifecycleCallback, PropertySpec, ResolvedArgs, ServiceDefinition,
    ServiceDefinitionBuilder, ServiceHandle, ServiceScope,
};
pub use errors::ContainerError;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn version() -> &'static str {
    VERSION
}
