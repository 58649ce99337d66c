//! Role permissions.
//!
//! Route guards and affordance hiding both ask `evaluate`, so a button is
//! shown exactly when the page behind it would let the user in.

use std::fmt;
use std::str::FromStr;

use crate::api::Role;
use crate::auth::AuthState;

/// Everything a user can attempt that depends on their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
  ViewDashboard,
  ViewClients,
  CreateClient,
  EditClient,
  DeleteClient,
  ViewJobs,
  ViewJobDetail,
  CreateJob,
  DeleteJob,
  UpdateJobStatus,
  UpdateChecklist,
  UploadPhoto,
  ViewInvoices,
  ManageInvoices,
  ViewMyJobs,
  CompleteOnboarding,
  EditProfile,
  ManageBusiness,
  ManageBilling,
  AdminPanel,
}

impl Action {
  pub const ALL: &'static [Action] = &[
    Action::ViewDashboard,
    Action::ViewClients,
    Action::CreateClient,
    Action::EditClient,
    Action::DeleteClient,
    Action::ViewJobs,
    Action::ViewJobDetail,
    Action::CreateJob,
    Action::DeleteJob,
    Action::UpdateJobStatus,
    Action::UpdateChecklist,
    Action::UploadPhoto,
    Action::ViewInvoices,
    Action::ManageInvoices,
    Action::ViewMyJobs,
    Action::CompleteOnboarding,
    Action::EditProfile,
    Action::ManageBusiness,
    Action::ManageBilling,
    Action::AdminPanel,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Action::ViewDashboard => "view-dashboard",
      Action::ViewClients => "view-clients",
      Action::CreateClient => "create-client",
      Action::EditClient => "edit-client",
      Action::DeleteClient => "delete-client",
      Action::ViewJobs => "view-jobs",
      Action::ViewJobDetail => "view-job",
      Action::CreateJob => "create-job",
      Action::DeleteJob => "delete-job",
      Action::UpdateJobStatus => "update-job-status",
      Action::UpdateChecklist => "update-checklist",
      Action::UploadPhoto => "upload-photo",
      Action::ViewInvoices => "view-invoices",
      Action::ManageInvoices => "manage-invoices",
      Action::ViewMyJobs => "view-my-jobs",
      Action::CompleteOnboarding => "onboarding",
      Action::EditProfile => "edit-profile",
      Action::ManageBusiness => "manage-business",
      Action::ManageBilling => "manage-billing",
      Action::AdminPanel => "admin",
    }
  }

  /// Roles allowed to perform this action.
  pub fn allowed_roles(&self) -> &'static [Role] {
    match self {
      Action::ViewDashboard
      | Action::ViewClients
      | Action::CreateClient
      | Action::EditClient
      | Action::DeleteClient
      | Action::ViewJobs
      | Action::CreateJob
      | Action::DeleteJob
      | Action::ViewInvoices
      | Action::ManageInvoices
      | Action::CompleteOnboarding
      | Action::ManageBusiness
      | Action::ManageBilling => &[Role::Owner],
      // Cleaners work their assigned jobs; owners can open any job
      Action::ViewJobDetail
      | Action::UpdateJobStatus
      | Action::UpdateChecklist
      | Action::UploadPhoto => &[Role::Owner, Role::Cleaner],
      Action::ViewMyJobs => &[Role::Cleaner],
      Action::EditProfile => &[Role::Owner, Role::Cleaner, Role::Admin],
      Action::AdminPanel => &[Role::Admin],
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Action {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_lowercase().replace('_', "-");
    Action::ALL
      .iter()
      .copied()
      .find(|a| a.as_str() == wanted)
      .ok_or_else(|| format!("unknown action '{}'", s))
  }
}

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
  pub allowed: bool,
  /// Why access was denied; `None` when allowed.
  pub reason: Option<String>,
}

impl Permission {
  fn allow() -> Self {
    Self {
      allowed: true,
      reason: None,
    }
  }

  fn deny(reason: String) -> Self {
    Self {
      allowed: false,
      reason: Some(reason),
    }
  }
}

pub fn evaluate(role: Role, action: Action) -> Permission {
  if action.allowed_roles().contains(&role) {
    Permission::allow()
  } else {
    Permission::deny(format!("{} users cannot {}", role, action))
  }
}

/// Like `evaluate`, denying everything to signed-out users.
pub fn evaluate_state(state: &AuthState, action: Action) -> Permission {
  match state.role() {
    Some(role) => evaluate(role, action),
    None => Permission::deny(format!("sign in to {}", action)),
  }
}

/// Shorthand for affordance checks.
pub fn can(role: Role, action: Action) -> bool {
  evaluate(role, action).allowed
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::UserRole;

  #[test]
  fn test_cleaner_cannot_create_clients() {
    let permission = evaluate(Role::Cleaner, Action::CreateClient);
    assert!(!permission.allowed);
    assert_eq!(
      permission.reason.as_deref(),
      Some("CLEANER users cannot create-client")
    );
    assert!(can(Role::Owner, Action::CreateClient));
  }

  #[test]
  fn test_cleaner_works_assigned_jobs() {
    assert!(can(Role::Cleaner, Action::ViewMyJobs));
    assert!(can(Role::Cleaner, Action::UpdateChecklist));
    assert!(can(Role::Cleaner, Action::UploadPhoto));
    assert!(!can(Role::Cleaner, Action::DeleteJob));
    assert!(!can(Role::Cleaner, Action::ViewInvoices));
  }

  #[test]
  fn test_admin_panel_is_admin_only() {
    assert!(can(Role::Admin, Action::AdminPanel));
    assert!(!can(Role::Owner, Action::AdminPanel));
    assert!(!can(Role::Admin, Action::ViewClients));
  }

  #[test]
  fn test_every_action_allows_someone() {
    for action in Action::ALL {
      assert!(!action.allowed_roles().is_empty(), "{} has no roles", action);
    }
  }

  #[test]
  fn test_signed_out_is_denied() {
    let permission = evaluate_state(&AuthState::Unauthenticated, Action::EditProfile);
    assert!(!permission.allowed);

    let owner = AuthState::Authenticated(UserRole {
      id: "u1".into(),
      email: "o@x.io".into(),
      role: Role::Owner,
    });
    assert!(evaluate_state(&owner, Action::EditProfile).allowed);
  }

  #[test]
  fn test_parse_action() {
    assert_eq!("create-client".parse::<Action>(), Ok(Action::CreateClient));
    assert_eq!("CREATE_CLIENT".parse::<Action>(), Ok(Action::CreateClient));
    assert!("fly".parse::<Action>().is_err());
    for action in Action::ALL {
      assert_eq!(action.as_str().parse::<Action>(), Ok(*action));
    }
  }
}
