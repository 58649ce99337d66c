//! Clenvora client layer: authenticated API access, a query cache with
//! stale-while-revalidate and retries, and role-based route guards.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod filters;
pub mod guard;
pub mod logging;
pub mod query;
pub mod upload;
