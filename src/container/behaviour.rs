//! Named behaviours: reusable decorators applied to services.
//!
//! A behaviour is registered like a service (a name, its dependency names and
//! a function of those dependencies) but yields an *engine* rather than a
//! service. Capability handles opt in to an engine by implementing
//! [`Decorate`], which wraps the handle in a proxy of the same type, so the
//! proxy exposes exactly the operations of its target.

use color_eyre::Result;
use std::any::type_name;

use super::error::{ContainerError, RegistryKind};
use super::registry::{Dependencies, Registration, ServiceContainer};

/// A decorator engine, stateless with respect to any single target.
pub trait Behaviour: Clone + Send + Sync + 'static {
  /// Per-use configuration supplied at the call site.
  type Options;
}

/// Implemented by capability handles that can be wrapped by behaviour `B`.
pub trait Decorate<B: Behaviour>: Sized {
  fn decorate(self, behaviour: &B, options: B::Options) -> Self;
}

impl ServiceContainer {
  /// Register a behaviour under `name`. Behaviour names live apart from
  /// service names, so the two may coincide.
  pub fn register_behaviour<B, F>(&self, name: &str, dependencies: &[&str], apply: F) -> Result<()>
  where
    B: Behaviour,
    F: Fn(&mut Dependencies) -> Result<B> + Send + Sync + 'static,
  {
    let registration = Registration::new(dependencies, apply);
    self
      .registry()?
      .insert(RegistryKind::Behaviour, name, registration)?;
    Ok(())
  }

  /// Wrap `target` in the behaviour registered under `name`.
  ///
  /// Stacking is explicit: pass the result of one `create_proxy` as the
  /// target of the next. The outermost behaviour runs first.
  pub fn create_proxy<B, T>(&self, name: &str, target: T, options: B::Options) -> Result<T>
  where
    B: Behaviour,
    T: Decorate<B>,
  {
    let (apply, dependencies) = {
      let registry = self.registry()?;
      let registration =
        registry
          .behaviours
          .get(name)
          .ok_or_else(|| ContainerError::UnknownBehaviour {
            name: name.to_string(),
          })?;
      (
        std::sync::Arc::clone(&registration.factory),
        registration.dependencies.clone(),
      )
    };

    let resolved = self.instances(&dependencies)?;
    let engine = apply(&mut Dependencies::new(dependencies, resolved))?;
    let engine = engine
      .downcast_ref::<B>()
      .cloned()
      .ok_or_else(|| ContainerError::TypeMismatch {
        name: name.to_string(),
        expected: type_name::<B>(),
      })?;

    Ok(target.decorate(&engine, options))
  }
}
