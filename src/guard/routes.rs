//! Page routes and the guard decision for each of them.

use std::fmt;

use super::permissions::{evaluate, Action};
use crate::api::Role;
use crate::auth::AuthState;

pub const LOGIN_PATH: &str = "/login";

/// Where each role lands after sign-in or after a denied navigation.
pub fn home_for(role: Role) -> &'static str {
  match role {
    Role::Owner => "/dashboard",
    Role::Admin => "/admin",
    Role::Cleaner => "/my-jobs",
  }
}

/// Pages reachable without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicPage {
  Login,
  Signup,
  ForgotPassword,
  ResetPassword,
  AuthCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsPage {
  Profile,
  Business,
  Billing,
}

/// A parsed page path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
  Public(PublicPage),
  Dashboard,
  Clients,
  NewClient,
  ClientDetail(String),
  EditClient(String),
  Jobs,
  NewJob,
  JobDetail(String),
  Invoices,
  NewInvoice,
  InvoiceDetail(String),
  /// `/admin` and everything below it
  Admin(Vec<String>),
  MyJobs,
  Onboarding,
  Settings(SettingsPage),
  NotFound,
}

impl Route {
  /// Parse a request path. Query string, fragment and trailing slashes are ignored.
  pub fn parse(path: &str) -> Route {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
      ["login"] => Route::Public(PublicPage::Login),
      ["signup"] => Route::Public(PublicPage::Signup),
      ["forgot-password"] => Route::Public(PublicPage::ForgotPassword),
      ["reset-password"] => Route::Public(PublicPage::ResetPassword),
      ["auth", "callback"] => Route::Public(PublicPage::AuthCallback),

      ["dashboard"] => Route::Dashboard,
      ["clients"] => Route::Clients,
      ["clients", "new"] => Route::NewClient,
      ["clients", id] => Route::ClientDetail(id.to_string()),
      ["clients", id, "edit"] => Route::EditClient(id.to_string()),
      ["jobs"] => Route::Jobs,
      ["jobs", "new"] => Route::NewJob,
      ["jobs", id] => Route::JobDetail(id.to_string()),
      ["invoices"] => Route::Invoices,
      ["invoices", "new"] => Route::NewInvoice,
      ["invoices", id] => Route::InvoiceDetail(id.to_string()),
      ["admin", rest @ ..] => Route::Admin(rest.iter().map(|s| s.to_string()).collect()),
      ["my-jobs"] => Route::MyJobs,
      ["onboarding"] => Route::Onboarding,
      ["settings"] | ["settings", "profile"] => Route::Settings(SettingsPage::Profile),
      ["settings", "business"] => Route::Settings(SettingsPage::Business),
      ["settings", "billing"] => Route::Settings(SettingsPage::Billing),
      _ => Route::NotFound,
    }
  }

  /// The action a user must be allowed to perform to see this page.
  /// `None` for public and unknown pages.
  pub fn action(&self) -> Option<Action> {
    let action = match self {
      Route::Public(_) | Route::NotFound => return None,
      Route::Dashboard => Action::ViewDashboard,
      Route::Clients | Route::ClientDetail(_) => Action::ViewClients,
      Route::NewClient => Action::CreateClient,
      Route::EditClient(_) => Action::EditClient,
      Route::Jobs => Action::ViewJobs,
      Route::NewJob => Action::CreateJob,
      Route::JobDetail(_) => Action::ViewJobDetail,
      Route::Invoices | Route::InvoiceDetail(_) => Action::ViewInvoices,
      Route::NewInvoice => Action::ManageInvoices,
      Route::Admin(_) => Action::AdminPanel,
      Route::MyJobs => Action::ViewMyJobs,
      Route::Onboarding => Action::CompleteOnboarding,
      Route::Settings(SettingsPage::Profile) => Action::EditProfile,
      Route::Settings(SettingsPage::Business) => Action::ManageBusiness,
      Route::Settings(SettingsPage::Billing) => Action::ManageBilling,
    };
    Some(action)
  }

  pub fn is_public(&self) -> bool {
    matches!(self, Route::Public(_))
  }
}

/// What to do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
  /// Public page, render for anyone
  Public,
  /// Signed in and allowed
  Authorized,
  /// Send the user elsewhere before anything renders
  Redirect(String),
  NotFound,
}

impl GuardDecision {
  pub fn may_render(&self) -> bool {
    matches!(self, GuardDecision::Public | GuardDecision::Authorized)
  }
}

impl fmt::Display for GuardDecision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GuardDecision::Public => f.write_str("public"),
      GuardDecision::Authorized => f.write_str("authorized"),
      GuardDecision::Redirect(to) => write!(f, "redirect to {}", to),
      GuardDecision::NotFound => f.write_str("not found"),
    }
  }
}

/// Decide a navigation from the resolved auth state alone.
pub fn decide(state: &AuthState, route: &Route) -> GuardDecision {
  let Some(action) = route.action() else {
    return match route {
      Route::NotFound => GuardDecision::NotFound,
      _ => GuardDecision::Public,
    };
  };

  match state.role() {
    None => GuardDecision::Redirect(LOGIN_PATH.to_string()),
    Some(role) if evaluate(role, action).allowed => GuardDecision::Authorized,
    Some(role) => GuardDecision::Redirect(home_for(role).to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::UserRole;

  const ROLES: [Role; 3] = [Role::Owner, Role::Cleaner, Role::Admin];

  fn signed_in(role: Role) -> AuthState {
    AuthState::Authenticated(UserRole {
      id: "u1".into(),
      email: "u@x.io".into(),
      role,
    })
  }

  fn protected_routes() -> Vec<Route> {
    [
      "/dashboard",
      "/clients",
      "/clients/new",
      "/clients/c1",
      "/clients/c1/edit",
      "/jobs",
      "/jobs/new",
      "/jobs/j1",
      "/invoices",
      "/invoices/new",
      "/invoices/i1",
      "/admin",
      "/admin/businesses",
      "/my-jobs",
      "/onboarding",
      "/settings",
      "/settings/business",
      "/settings/billing",
    ]
    .iter()
    .map(|p| Route::parse(p))
    .collect()
  }

  #[test]
  fn test_parse_routes() {
    assert_eq!(Route::parse("/clients/new"), Route::NewClient);
    assert_eq!(Route::parse("/clients/c1/edit/"), Route::EditClient("c1".into()));
    assert_eq!(Route::parse("/jobs/j1?tab=photos"), Route::JobDetail("j1".into()));
    assert_eq!(
      Route::parse("/admin/businesses/b1"),
      Route::Admin(vec!["businesses".into(), "b1".into()])
    );
    assert_eq!(Route::parse("/auth/callback#token"), Route::Public(PublicPage::AuthCallback));
    assert_eq!(Route::parse("/"), Route::NotFound);
    assert_eq!(Route::parse("/billing"), Route::NotFound);
  }

  #[test]
  fn test_signed_out_goes_to_login() {
    for route in protected_routes() {
      assert_eq!(
        decide(&AuthState::Unauthenticated, &route),
        GuardDecision::Redirect("/login".into()),
        "{:?}",
        route
      );
    }
  }

  #[test]
  fn test_disallowed_roles_redirect_home() {
    for role in ROLES {
      let state = signed_in(role);
      for route in protected_routes() {
        let action = route.action().unwrap();
        let decision = decide(&state, &route);
        if evaluate(role, action).allowed {
          assert_eq!(decision, GuardDecision::Authorized, "{} on {:?}", role, route);
        } else {
          assert_eq!(
            decision,
            GuardDecision::Redirect(home_for(role).to_string()),
            "{} on {:?}",
            role,
            route
          );
        }
      }
    }
  }

  #[test]
  fn test_home_is_always_reachable() {
    for role in ROLES {
      let home = Route::parse(home_for(role));
      assert_eq!(decide(&signed_in(role), &home), GuardDecision::Authorized);
    }
  }

  #[test]
  fn test_cleaner_on_new_client_goes_to_my_jobs() {
    let decision = decide(&signed_in(Role::Cleaner), &Route::parse("/clients/new"));
    assert_eq!(decision, GuardDecision::Redirect("/my-jobs".into()));
    assert!(!decision.may_render());
  }

  #[test]
  fn test_public_and_unknown_pages() {
    for path in ["/login", "/signup", "/forgot-password", "/reset-password", "/auth/callback"] {
      assert_eq!(decide(&AuthState::Unauthenticated, &Route::parse(path)), GuardDecision::Public);
      assert_eq!(decide(&signed_in(Role::Owner), &Route::parse(path)), GuardDecision::Public);
    }
    assert_eq!(
      decide(&AuthState::Unauthenticated, &Route::parse("/nope")),
      GuardDecision::NotFound
    );
  }
}
