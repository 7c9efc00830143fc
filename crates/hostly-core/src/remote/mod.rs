//! Remote profiles
//!
//! - `fetcher`: one network retrieval of a profile source
//! - `scheduler`: due-checks, manual triggers and the per-profile in-flight guard

pub mod fetcher;
pub mod scheduler;

// Re-exports
pub use fetcher::{validate_source_url, HttpFetcher, RemoteFetcher};
pub use scheduler::{is_due, Clock, SystemClock, UpdateScheduler};
