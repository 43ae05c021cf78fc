//! Service composition: a lazy dependency-injection container plus a
//! registry of behaviours that decorate services with transparent proxies.
//!
//! - Services are registered by name with the names of their dependencies
//! - Resolution is dependency-first and memoized, one instance per name
//! - Cycles and unknown names are reported as [`ContainerError`]s
//! - Behaviours wrap a capability handle in a proxy of the same type

mod behaviour;
mod error;
mod registry;

pub use behaviour::{Behaviour, Decorate};
pub use error::ContainerError;
pub use registry::{ServiceContainer, ServiceKey};
