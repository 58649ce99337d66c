//! Sessions, the auth provider and role resolution.

mod provider;
mod role;
mod session;

pub use provider::{AuthProvider, ProviderUser};
pub use role::{
  clear_cache_on_auth_change, lookup_user, AuthState, CurrentUser, RoleResolver,
  DEFAULT_ROLE_TIMEOUT,
};
pub use session::{AuthEvent, FileSessionStore, MemorySessionStore, Session, SessionStore};
