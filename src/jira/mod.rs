//! Jira boundary: the HTTP client, response mapping, cached metadata and the
//! issue repository that the rest of the application works through.

mod api_types;
mod client;
mod metadata;
mod repository;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use client::{JiraClient, TrackerBackend};
pub use metadata::Metadata;
pub use repository::{cache_options, retry_options, JiraRepository, Tracker};
