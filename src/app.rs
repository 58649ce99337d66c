use chrono::Duration;
use color_eyre::{eyre::bail, eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use clenvora::api::api_types::ClientInput;
use clenvora::api::{ApiClient, CachedApiClient, InvoiceStatus, Job, JobStatus, Role, UserRole};
use clenvora::auth::{
  clear_cache_on_auth_change, AuthProvider, AuthState, FileSessionStore, RoleResolver, Session,
  SessionStore,
};
use clenvora::config::Config;
use clenvora::filters::{filter_invoices, search_clients, JobFilter};
use clenvora::guard::{
  can, evaluate_state, home_for, Action, GuardCheck, GuardDecision, RouteGuard,
};
use clenvora::query::QueryClient;
use clenvora::upload::{PhotoFile, PhotoUpload, StorageUploader};

use crate::{AdminCommand, Command};

/// Wiring for one CLI invocation.
pub struct App {
  sessions: Arc<FileSessionStore>,
  api: CachedApiClient,
  resolver: RoleResolver,
  guard: RouteGuard,
  provider: Option<AuthProvider>,
  storage: Option<StorageUploader>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let sessions = Arc::new(FileSessionStore::open_default()?);
    let api = ApiClient::from_config(&config, sessions.clone())?;
    let cache = QueryClient::new(config.query.options());
    clear_cache_on_auth_change(sessions.subscribe(), cache.clone());

    let resolver =
      RoleResolver::new(sessions.clone(), api.clone()).with_timeout(config.query.role_timeout());

    Ok(Self {
      guard: RouteGuard::new(resolver.clone()),
      resolver,
      api: CachedApiClient::new(api, cache),
      provider: AuthProvider::from_config(&config.auth)?,
      storage: StorageUploader::from_config(&config.storage)?,
      sessions,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Login { token, expires_in } => self.login(token, expires_in).await,
      Command::ExchangeCode { code, verifier } => self.exchange_code(&code, &verifier).await,
      Command::Logout => self.logout().await,
      Command::Whoami => self.whoami().await,
      Command::Guard { path } => {
        let check = self.guard.check(&path).await;
        println!("{} -> {}", path, check.decision);
        Ok(())
      }
      Command::Can { action } => {
        let action: Action = action.parse().map_err(|e: String| eyre!(e))?;
        let state = self.resolver.resolve().await;
        let permission = evaluate_state(&state, action);
        match permission.reason {
          None => println!("allowed: {}", action),
          Some(reason) => println!("denied: {}", reason),
        }
        Ok(())
      }
      Command::Dashboard => self.dashboard().await,
      Command::Jobs { status, search } => self.jobs(status, search).await,
      Command::Job { id } => self.job(&id).await,
      Command::DeleteJob { id } => self.delete_job(&id).await,
      Command::JobStatus { id, status } => self.job_status(&id, &status).await,
      Command::CheckItem { job, item, undone } => self.check_item(&job, &item, !undone).await,
      Command::Clients { search } => self.clients(search).await,
      Command::CreateClient {
        name,
        email,
        phone,
        address,
      } => {
        self
          .create_client(ClientInput {
            name,
            email: Some(email),
            phone,
            address,
            notes: None,
          })
          .await
      }
      Command::Invoices { status } => self.invoices(status).await,
      Command::Business => self.business().await,
      Command::Admin {
        command: AdminCommand::Businesses,
      } => self.admin_businesses().await,
      Command::UploadPhoto { job, file, caption } => self.upload_photo(&job, &file, caption).await,
      Command::ResetPassword { email, redirect_to } => {
        let provider = self.provider()?;
        provider
          .reset_password_for_email(&email, redirect_to.as_deref())
          .await?;
        println!("If {} has an account, a reset link is on its way.", email);
        Ok(())
      }
    }
  }

  fn provider(&self) -> Result<&AuthProvider> {
    self
      .provider
      .as_ref()
      .ok_or_else(|| eyre!("Auth provider is not configured (auth.url and auth.anon_key)"))
  }

  /// Guard `path` and return the signed-in user, or fail with where the
  /// guard would have sent them.
  async fn require(&self, path: &str) -> Result<UserRole> {
    let check = self.guard.check(path).await;
    Self::authorized(path, check)
  }

  fn authorized(path: &str, check: GuardCheck) -> Result<UserRole> {
    match (check.decision, check.state) {
      (GuardDecision::Authorized, AuthState::Authenticated(user)) => Ok(user),
      (GuardDecision::Redirect(to), AuthState::Unauthenticated) => {
        bail!("Not signed in (redirected to {}). Run `clenvora login` first.", to)
      }
      (GuardDecision::Redirect(to), _) => {
        bail!("{} is not available to you (redirected to {})", path, to)
      }
      (decision, _) => bail!("{}: {}", path, decision),
    }
  }

  fn require_action(user: &UserRole, action: Action) -> Result<()> {
    if !can(user.role, action) {
      bail!("{} users cannot {}", user.role, action);
    }
    Ok(())
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  async fn login(&self, token: String, expires_in: i64) -> Result<()> {
    let lifetime = session_lifetime(expires_in)?;
    if let Some(provider) = &self.provider {
      let user = provider.get_user(&token).await?;
      info!(user = %user.id, "token verified with auth provider");
    }

    self.sessions.set_session(Session::new(token, lifetime)).await?;
    self.report_sign_in().await
  }

  async fn exchange_code(&self, code: &str, verifier: &str) -> Result<()> {
    let session = self.provider()?.exchange_code_for_session(code, verifier).await?;
    self.sessions.set_session(session).await?;
    self.report_sign_in().await
  }

  async fn report_sign_in(&self) -> Result<()> {
    match self.resolver.try_resolve().await? {
      AuthState::Authenticated(user) => {
        println!("Signed in as {} ({}), home is {}", user.email, user.role, home_for(user.role));
      }
      AuthState::Unauthenticated => println!("Session stored, but the API did not recognize it"),
    }
    Ok(())
  }

  async fn logout(&self) -> Result<()> {
    if let (Some(provider), Some(session)) = (&self.provider, self.sessions.get_session().await) {
      if let Err(err) = provider.sign_out(&session.access_token).await {
        warn!(error = %err, "auth provider sign-out failed, clearing local session anyway");
      }
    }
    self.sessions.sign_out().await?;
    println!("Signed out");
    Ok(())
  }

  async fn whoami(&self) -> Result<()> {
    match self.resolver.try_resolve().await? {
      AuthState::Authenticated(user) => {
        println!("{} {} {}", user.id, user.email, user.role);
      }
      AuthState::Unauthenticated => println!("Not signed in"),
    }
    Ok(())
  }

  // ==========================================================================
  // Pages
  // ==========================================================================

  async fn dashboard(&self) -> Result<()> {
    self.require("/dashboard").await?;
    let stats = self.api.dashboard_stats().await?;
    println!("Clients           {}", stats.total_clients);
    println!("Jobs today        {}", stats.jobs_today);
    println!("Upcoming jobs     {}", stats.upcoming_jobs);
    println!("Completed jobs    {}", stats.completed_jobs);
    println!("Outstanding       {}", money(stats.outstanding_cents));
    println!("Revenue (month)   {}", money(stats.revenue_this_month_cents));
    Ok(())
  }

  async fn jobs(&self, status: Option<String>, search: Option<String>) -> Result<()> {
    let status = status
      .map(|s| s.parse::<JobStatus>())
      .transpose()
      .map_err(|e| eyre!(e))?;

    // Cleaners get their own job list page
    let state = self.resolver.resolve().await;
    let page = match state.role() {
      Some(Role::Cleaner) => "/my-jobs",
      _ => "/jobs",
    };
    let user = Self::authorized(page, self.guard.check_state(page, state))?;

    let jobs = self.api.jobs(&user, status).await?;
    let filter = JobFilter {
      status,
      search,
      ..JobFilter::default()
    };
    let shown = filter.apply(&jobs);
    if shown.is_empty() {
      println!("No jobs");
    }
    for job in shown {
      print_job_line(job);
    }
    Ok(())
  }

  async fn job(&self, id: &str) -> Result<()> {
    self.require(&format!("/jobs/{}", id)).await?;
    let job = self.api.job(id).await?;

    print_job_line(&job);
    if let Some(address) = job.client.as_ref().and_then(|c| c.address.as_deref()) {
      println!("  address: {}", address);
    }
    if let Some(notes) = &job.notes {
      println!("  notes: {}", notes);
    }
    for item in &job.checklist {
      let mark = if item.completed { "x" } else { " " };
      println!("  [{}] {} ({})", mark, item.label, item.id);
    }
    for photo in &job.photos {
      println!("  photo: {}", photo.url);
    }
    Ok(())
  }

  async fn delete_job(&self, id: &str) -> Result<()> {
    let user = self.require(&format!("/jobs/{}", id)).await?;
    Self::require_action(&user, Action::DeleteJob)?;
    let job = self.api.job(id).await?;
    self.api.delete_job(&job).await?;
    println!("Deleted job {}", id);
    Ok(())
  }

  async fn job_status(&self, id: &str, status: &str) -> Result<()> {
    let status: JobStatus = status.parse().map_err(|e: String| eyre!(e))?;
    let user = self.require(&format!("/jobs/{}", id)).await?;
    Self::require_action(&user, Action::UpdateJobStatus)?;
    let job = self.api.set_job_status(id, status).await?;
    print_job_line(&job);
    Ok(())
  }

  async fn check_item(&self, job_id: &str, item_id: &str, completed: bool) -> Result<()> {
    let user = self.require(&format!("/jobs/{}", job_id)).await?;
    Self::require_action(&user, Action::UpdateChecklist)?;
    let item = self.api.set_checklist_item(job_id, item_id, completed).await?;
    let mark = if item.completed { "x" } else { " " };
    println!("[{}] {}", mark, item.label);
    Ok(())
  }

  async fn clients(&self, search: Option<String>) -> Result<()> {
    self.require("/clients").await?;
    let clients = self.api.clients().await?;
    for client in search_clients(&clients, search.as_deref()) {
      println!(
        "{:<12} {:<30} {:<30} {}",
        client.id,
        client.name,
        client.email.as_deref().unwrap_or("-"),
        client.phone.as_deref().unwrap_or("-")
      );
    }
    Ok(())
  }

  async fn create_client(&self, input: ClientInput) -> Result<()> {
    let user = self.require("/clients/new").await?;
    Self::require_action(&user, Action::CreateClient)?;
    let client = self.api.create_client(&input).await?;
    println!("Created client {} ({})", client.name, client.id);
    Ok(())
  }

  async fn invoices(&self, status: Option<String>) -> Result<()> {
    let status = status
      .map(|s| s.parse::<InvoiceStatus>())
      .transpose()
      .map_err(|e| eyre!(e))?;
    self.require("/invoices").await?;

    let invoices = self.api.invoices(status).await?;
    for invoice in filter_invoices(&invoices, status) {
      println!(
        "{:<12} {:<10} {:>12} due {}  {}",
        invoice.number.as_deref().unwrap_or(&invoice.id),
        invoice.status,
        money(invoice.amount_cents),
        invoice
          .due_date
          .map(|d| d.to_string())
          .unwrap_or_else(|| "-".to_string()),
        invoice.client_name.as_deref().unwrap_or(&invoice.client_id)
      );
    }
    Ok(())
  }

  async fn business(&self) -> Result<()> {
    self.require("/settings/business").await?;
    let business = self.api.business().await?;
    println!("{} ({})", business.name, business.id);
    for (label, value) in [
      ("email", &business.email),
      ("phone", &business.phone),
      ("address", &business.address),
      ("currency", &business.currency),
    ] {
      if let Some(value) = value {
        println!("  {}: {}", label, value);
      }
    }
    Ok(())
  }

  async fn admin_businesses(&self) -> Result<()> {
    self.require("/admin/businesses").await?;
    for business in self.api.admin_businesses().await? {
      println!(
        "{:<12} {:<30} {:<30} clients={} jobs={}",
        business.id,
        business.name,
        business.owner_email.as_deref().unwrap_or("-"),
        business.client_count,
        business.job_count
      );
    }
    Ok(())
  }

  async fn upload_photo(&self, job_id: &str, file: &Path, caption: Option<String>) -> Result<()> {
    let user = self.require(&format!("/jobs/{}", job_id)).await?;
    Self::require_action(&user, Action::UploadPhoto)?;
    let storage = self
      .storage
      .as_ref()
      .ok_or_else(|| eyre!("Photo storage is not configured (storage.public_key)"))?;

    let mut upload = PhotoUpload::new(job_id);
    upload.select(PhotoFile::read(file).await?)?;
    let photo = upload.upload(storage, &self.api, caption).await?;
    println!("Uploaded {}", photo.url);
    Ok(())
  }
}

fn print_job_line(job: &Job) {
  let (done, total) = job.checklist_progress();
  println!(
    "{:<12} {:<12} {}  {:<24} {:<16} {}/{}",
    job.id,
    job.status,
    job.scheduled_at.format("%Y-%m-%d %H:%M"),
    job.client.as_ref().map(|c| c.name.as_str()).unwrap_or("-"),
    job.cleaner_name.as_deref().unwrap_or("unassigned"),
    done,
    total
  );
}

fn session_lifetime(expires_in: i64) -> Result<Duration> {
  if expires_in <= 0 {
    bail!("--expires-in must be positive");
  }
  Duration::try_seconds(expires_in).ok_or_else(|| eyre!("--expires-in {} is too large", expires_in))
}

fn money(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let cents = cents.unsigned_abs();
  format!("{}${}.{:02}", sign, cents / 100, cents % 100)
}
