//! Route guards.
//!
//! A guard resolves the user's role, decides the navigation, and only then
//! lets page data load. Nothing behind a denied route is ever fetched.

mod permissions;
mod routes;

use std::future::Future;
use tracing::{debug, info};

use crate::auth::{AuthState, RoleResolver};

pub use permissions::{can, evaluate, evaluate_state, Action, Permission};
pub use routes::{decide, home_for, GuardDecision, PublicPage, Route, SettingsPage, LOGIN_PATH};

/// Outcome of guarding one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardCheck {
  pub route: Route,
  pub state: AuthState,
  pub decision: GuardDecision,
}

/// Page content, or the decision that kept it from loading.
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
  Rendered(T),
  Blocked(GuardDecision),
}

#[derive(Clone)]
pub struct RouteGuard {
  resolver: RoleResolver,
}

impl RouteGuard {
  pub fn new(resolver: RoleResolver) -> Self {
    Self { resolver }
  }

  /// Resolve the role and decide `path`.
  ///
  /// Public and unknown pages are decided without a role lookup.
  pub async fn check(&self, path: &str) -> GuardCheck {
    let state = if Route::parse(path).action().is_some() {
      self.resolver.resolve().await
    } else {
      AuthState::Unauthenticated
    };
    self.check_state(path, state)
  }

  /// Decide `path` for an already resolved `state`.
  pub fn check_state(&self, path: &str, state: AuthState) -> GuardCheck {
    let route = Route::parse(path);
    let decision = decide(&state, &route);

    match &decision {
      GuardDecision::Redirect(to) => {
        info!(path, to = %to, role = ?state.role(), "navigation redirected")
      }
      _ => debug!(path, %decision, "navigation"),
    }

    GuardCheck {
      route,
      state,
      decision,
    }
  }

  /// Guard `path`, then run `load` only if the page may render.
  pub async fn authorize_then<T, F, Fut>(&self, path: &str, load: F) -> Guarded<T>
  where
    F: FnOnce(GuardCheck) -> Fut,
    Fut: Future<Output = T>,
  {
    let check = self.check(path).await;
    if check.decision.may_render() {
      Guarded::Rendered(load(check).await)
    } else {
      Guarded::Blocked(check.decision)
    }
  }
}
