//! Behaviour engines that capability decorators delegate to.

mod cache;
mod retry;

pub use cache::{CacheOptions, CacheProxy, KeyRule};
#[cfg(test)]
pub use retry::RecordingSleeper;
pub use retry::{Backoff, RetryOptions, RetryPolicy, RetryProxy};
