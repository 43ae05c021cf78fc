//! Cache-wrapping behaviour.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::cache::Cache;
use crate::container::Behaviour;

/// How an intercepted call is turned into a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
  /// The method name alone, for calls without arguments
  Method,
  /// `method:arg1:arg2...`
  MethodWithArgs,
  /// `method:` followed by the SHA-256 of the arguments, for long inputs like JQL
  Hashed,
}

impl KeyRule {
  pub fn derive(&self, method: &str, args: &[&str]) -> String {
    match self {
      KeyRule::Method => method.to_string(),
      KeyRule::MethodWithArgs if args.is_empty() => method.to_string(),
      KeyRule::MethodWithArgs => format!("{}:{}", method, args.join(":")),
      KeyRule::Hashed => {
        let mut hasher = Sha256::new();
        for arg in args {
          hasher.update(arg.as_bytes());
          hasher.update([0u8]);
        }
        format!("{}:{}", method, hex::encode(hasher.finalize()))
      }
    }
  }
}

/// Per-method caching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodCache {
  pub ttl: Duration,
  pub key: KeyRule,
}

/// Which methods a [`CacheProxy`] intercepts.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
  methods: HashMap<String, MethodCache>,
}

impl CacheOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn method(mut self, name: &str, ttl: Duration, key: KeyRule) -> Self {
    self.methods.insert(name.to_string(), MethodCache { ttl, key });
    self
  }

  pub fn rule(&self, name: &str) -> Option<&MethodCache> {
    self.methods.get(name)
  }
}

/// Memoizes selected method calls through a [`Cache`].
///
/// Capability decorators route every operation through [`call`](Self::call);
/// methods without a rule in the options run untouched.
#[derive(Debug, Clone)]
pub struct CacheProxy {
  cache: Cache,
}

impl Behaviour for CacheProxy {
  type Options = CacheOptions;
}

impl CacheProxy {
  pub fn new(cache: Cache) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &Cache {
    &self.cache
  }

  /// Serve `method(args)` from the cache when fresh, otherwise `invoke` the
  /// target and store what it returns. Failures are never cached.
  pub async fn call<T, F, Fut>(
    &self,
    options: &CacheOptions,
    method: &str,
    args: &[&str],
    invalidate: bool,
    invoke: F,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let Some(rule) = options.rule(method) else {
      return invoke().await;
    };

    let key = rule.key.derive(method, args);
    self.cache.remember(&key, rule.ttl, invalidate, invoke).await
  }

  /// Drop what [`call`](Self::call) stored for `method(args)`, if the method
  /// is cached at all.
  pub fn forget(&self, options: &CacheOptions, method: &str, args: &[&str]) -> Result<()> {
    match options.rule(method) {
      Some(rule) => self.cache.invalidate(&rule.key.derive(method, args)),
      None => Ok(()),
    }
  }
}
