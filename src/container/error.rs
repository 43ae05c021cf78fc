//! Wiring errors raised by the service container.

use std::fmt;
use thiserror::Error;

/// Which of the two registries a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
  Service,
  Behaviour,
}

impl fmt::Display for RegistryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RegistryKind::Service => f.write_str("service"),
      RegistryKind::Behaviour => f.write_str("behaviour"),
    }
  }
}

/// Configuration errors in the service graph.
///
/// None of these are recoverable at runtime: they indicate a wiring bug and
/// are expected to abort bootstrap with the message below.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
  #[error("{kind} `{name}` is already registered")]
  DuplicateRegistration { kind: RegistryKind, name: String },

  #[error("no service registered under `{name}`")]
  UnknownService { name: String },

  #[error("no behaviour registered under `{name}`")]
  UnknownBehaviour { name: String },

  #[error("cyclic dependency: {}", chain.join(" -> "))]
  CyclicDependency { chain: Vec<String> },

  #[error("`{name}` does not hold a value of type {expected}")]
  TypeMismatch { name: String, expected: &'static str },

  #[error("factory asked for an undeclared dependency of type {expected}")]
  UndeclaredDependency { expected: &'static str },
}
