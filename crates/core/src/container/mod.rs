pub mod definition;
pub mod factory;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod singleton;

pub(crate) mod creator;
pub(crate) mod merge;

pub use definition::{
    ConstructorArg, LifecycleCallback, PropertySpec, PropertyValue, ResolvedArgs,
    ServiceActivation, ServiceDefinition, ServiceDefinitionBuilder,
};
pub use factory::Container;
pub use lifecycle::{Disposable, DisposalFailure, DisposalRegistry, Initializable};
pub use registry::DefinitionRegistry;
pub use resolver::DependencyDescriptor;
pub use scope::{CustomScope, ServiceHandle, ServiceScope};
pub use singleton::SingletonRegistry;
