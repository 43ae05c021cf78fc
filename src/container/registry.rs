//! Lazy, name-keyed service container with singleton semantics.

use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::debug;

use super::error::{ContainerError, RegistryKind};

pub(super) type Instance = Arc<dyn Any + Send + Sync>;
pub(super) type Factory = Arc<dyn Fn(&mut Dependencies) -> Result<Instance> + Send + Sync>;

/// A factory plus the names it needs, in declaration order.
pub(super) struct Registration {
  pub(super) factory: Factory,
  pub(super) dependencies: Vec<String>,
}

impl Registration {
  pub(super) fn new<T, F>(dependencies: &[&str], factory: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&mut Dependencies) -> Result<T> + Send + Sync + 'static,
  {
    Self {
      factory: Arc::new(move |deps: &mut Dependencies| {
        Ok(Arc::new(factory(deps)?) as Instance)
      }),
      dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
    }
  }
}

#[derive(Default)]
pub(super) struct Registry {
  pub(super) services: HashMap<String, Registration>,
  pub(super) behaviours: HashMap<String, Registration>,
  instances: HashMap<String, Instance>,
}

impl Registry {
  pub(super) fn insert(
    &mut self,
    kind: RegistryKind,
    name: &str,
    registration: Registration,
  ) -> std::result::Result<(), ContainerError> {
    let table = match kind {
      RegistryKind::Service => &mut self.services,
      RegistryKind::Behaviour => &mut self.behaviours,
    };
    if table.contains_key(name) {
      return Err(ContainerError::DuplicateRegistration {
        kind,
        name: name.to_string(),
      });
    }
    table.insert(name.to_string(), registration);
    Ok(())
  }
}

/// Typed handle to a registered service name.
///
/// Pairs the string name with the Rust type its factory produces, so call
/// sites resolve through [`ServiceContainer::get`] without restating the type.
pub struct ServiceKey<T> {
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> ServiceKey<T> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      _marker: PhantomData,
    }
  }

  pub const fn name(&self) -> &'static str {
    self.name
  }
}

impl<T> Clone for ServiceKey<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for ServiceKey<T> {}

impl<T> std::fmt::Debug for ServiceKey<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "ServiceKey({})", self.name)
  }
}

/// Resolved dependencies handed to a factory, consumed in declaration order.
pub struct Dependencies {
  entries: std::vec::IntoIter<(String, Instance)>,
}

impl Dependencies {
  pub(super) fn new(names: Vec<String>, instances: Vec<Instance>) -> Self {
    Self {
      entries: names
        .into_iter()
        .zip(instances)
        .collect::<Vec<_>>()
        .into_iter(),
    }
  }

  /// Take the next declared dependency as a `T`.
  pub fn next<T: Clone + 'static>(&mut self) -> std::result::Result<T, ContainerError> {
    let (name, instance) = self
      .entries
      .next()
      .ok_or(ContainerError::UndeclaredDependency {
        expected: type_name::<T>(),
      })?;
    downcast(&name, &instance)
  }
}

fn downcast<T: Clone + 'static>(
  name: &str,
  instance: &Instance,
) -> std::result::Result<T, ContainerError> {
  let any: &(dyn Any + Send + Sync) = &**instance;
  any
    .downcast_ref::<T>()
    .cloned()
    .ok_or_else(|| ContainerError::TypeMismatch {
      name: name.to_string(),
      expected: type_name::<T>(),
    })
}

/// Service container: named factories resolved lazily into singletons.
///
/// Created once at process entry and passed by reference to whatever needs
/// to resolve a name. Services are stored as cheap-to-clone handles
/// (`Arc<_>` or types wrapping one); every resolution of a name returns a
/// clone of the same instance.
///
/// Factories only see their declared [`Dependencies`]; no lock is held while
/// a factory runs, so a factory may itself resolve names or create proxies.
#[derive(Default)]
pub struct ServiceContainer {
  registry: Mutex<Registry>,
  /// Names under construction, per resolving thread, outermost first.
  resolving: Mutex<HashMap<ThreadId, Vec<String>>>,
}

/// Marks a name as under construction until dropped.
struct Resolving<'a> {
  container: &'a ServiceContainer,
}

impl Drop for Resolving<'_> {
  fn drop(&mut self) {
    if let Ok(mut resolving) = self.container.resolving.lock() {
      let id = thread::current().id();
      if let Some(path) = resolving.get_mut(&id) {
        path.pop();
        if path.is_empty() {
          resolving.remove(&id);
        }
      }
    }
  }
}

impl ServiceContainer {
  pub fn new() -> Self {
    Self::default()
  }

  pub(super) fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
    self
      .registry
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Register a factory under `name`.
  ///
  /// Dependencies are names, checked only when `name` is first resolved, so
  /// they may be registered later. Registering a name twice fails and keeps
  /// the first registration.
  pub fn register_service<T, F>(&self, name: &str, dependencies: &[&str], factory: F) -> Result<()>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn(&mut Dependencies) -> Result<T> + Send + Sync + 'static,
  {
    let registration = Registration::new(dependencies, factory);
    self
      .registry()?
      .insert(RegistryKind::Service, name, registration)?;
    Ok(())
  }

  /// Typed variant of [`register_service`](Self::register_service).
  pub fn register<T, F>(&self, key: ServiceKey<T>, dependencies: &[&str], factory: F) -> Result<()>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn(&mut Dependencies) -> Result<T> + Send + Sync + 'static,
  {
    self.register_service(key.name(), dependencies, factory)
  }

  pub fn contains(&self, name: &str) -> bool {
    self
      .registry()
      .map(|r| r.services.contains_key(name))
      .unwrap_or(false)
  }

  /// Resolve the singleton registered under `name`.
  pub fn resolve<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
    let instance = self.instance(name)?;
    Ok(downcast(name, &instance)?)
  }

  pub fn get<T: Clone + Send + Sync + 'static>(&self, key: ServiceKey<T>) -> Result<T> {
    self.resolve(key.name())
  }

  /// Resolve each name in order.
  pub(super) fn instances(&self, names: &[String]) -> Result<Vec<Instance>> {
    names.iter().map(|name| self.instance(name)).collect()
  }

  /// Push `name` on this thread's resolution path. Meeting a name that is
  /// already on the path is a cycle, whether it is reached through declared
  /// dependencies or from inside a running factory.
  fn enter(&self, name: &str) -> Result<Resolving<'_>> {
    let mut resolving = self
      .resolving
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let path = resolving.entry(thread::current().id()).or_default();

    if path.iter().any(|n| n == name) {
      let mut chain = path.clone();
      chain.push(name.to_string());
      return Err(ContainerError::CyclicDependency { chain }.into());
    }

    path.push(name.to_string());
    Ok(Resolving { container: self })
  }

  /// Post-order resolution: dependencies first, then the factory, then the
  /// memo table.
  fn instance(&self, name: &str) -> Result<Instance> {
    let (factory, dependencies) = {
      let registry = self.registry()?;
      if let Some(instance) = registry.instances.get(name) {
        return Ok(Arc::clone(instance));
      }
      let registration =
        registry
          .services
          .get(name)
          .ok_or_else(|| ContainerError::UnknownService {
            name: name.to_string(),
          })?;
      (
        Arc::clone(&registration.factory),
        registration.dependencies.clone(),
      )
    };

    let _resolving = self.enter(name)?;
    let resolved = self.instances(&dependencies)?;

    let mut deps = Dependencies::new(dependencies, resolved);
    let instance = factory(&mut deps).wrap_err_with(|| format!("failed to construct service `{}`", name))?;
    debug!(service = name, "constructed service");

    // First writer wins so concurrent resolvers still share one instance.
    let mut registry = self.registry()?;
    Ok(Arc::clone(
      registry
        .instances
        .entry(name.to_string())
        .or_insert(instance),
    ))
  }
}
