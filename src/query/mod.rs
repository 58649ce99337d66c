//! Client-side query cache for server data.
//!
//! This module provides a transport-agnostic caching mechanism that:
//! - Addresses every read by a semantic `QueryKey`
//! - Shares one in-flight fetch between concurrent readers of a key
//! - Serves fresh data from memory and revalidates stale data in the background
//! - Retries transient failures with exponential backoff
//! - Invalidates keys (by prefix) after successful mutations

mod client;
mod key;
mod observer;
mod retry;

pub use client::{CacheResult, CacheSource, EntryState, EntryStatus, QueryClient, QueryOptions};
pub use key::QueryKey;
pub use observer::{Query, QueryState};
pub use retry::RetryPolicy;
