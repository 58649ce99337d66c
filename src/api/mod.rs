//! Typed access to the Clenvora REST API.

pub mod api_types;
pub mod cache;
mod cached_client;
mod client;
pub mod types;

pub use cache::ApiQuery;
pub use cached_client::CachedApiClient;
pub(crate) use client::error_from_response;
pub use client::{ApiClient, TokenProvider};
pub use types::{
  AdminBusiness, Business, ChecklistItem, Client, DashboardStats, Invoice, InvoiceStatus, Job,
  JobClient, JobPhoto, JobStatus, Role, SubscriptionStatus, UserRole,
};
