mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use clenvora::config::Config;
use clenvora::logging::{self, LogTarget};

#[derive(Parser, Debug)]
#[command(name = "clenvora")]
#[command(about = "Command line client for the Clenvora cleaning-business API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/clenvora/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Store an access token as the current session
  Login {
    #[arg(long)]
    token: String,
    /// Session lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    expires_in: i64,
  },
  /// Finish a sign-in link by exchanging its code for a session
  ExchangeCode {
    code: String,
    #[arg(long)]
    verifier: String,
  },
  /// End the current session
  Logout,
  /// Show the signed-in user and role
  Whoami,
  /// Show what the route guard decides for a page path
  Guard { path: String },
  /// Check whether the current user may perform an action
  Can { action: String },
  /// Business overview
  Dashboard,
  /// List jobs
  Jobs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    search: Option<String>,
  },
  /// Show one job with its checklist
  Job { id: String },
  /// Delete a job that has not started
  DeleteJob { id: String },
  /// Start, complete or cancel a job
  JobStatus { id: String, status: String },
  /// Tick or untick a checklist item
  CheckItem {
    job: String,
    item: String,
    #[arg(long)]
    undone: bool,
  },
  /// List clients
  Clients {
    #[arg(long)]
    search: Option<String>,
  },
  /// Add a client
  CreateClient {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
  },
  /// List invoices
  Invoices {
    #[arg(long)]
    status: Option<String>,
  },
  /// Show business settings
  Business,
  /// Platform administration
  Admin {
    #[command(subcommand)]
    command: AdminCommand,
  },
  /// Upload a photo to a job
  UploadPhoto {
    job: String,
    file: PathBuf,
    #[arg(long)]
    caption: Option<String>,
  },
  /// Email a password reset link
  ResetPassword {
    email: String,
    #[arg(long)]
    redirect_to: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
  /// Every business on the platform
  Businesses,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let target = if args.log_stderr {
    LogTarget::Stderr
  } else {
    LogTarget::default_file()?
  };
  let _log_guard = logging::init(&target, args.verbose)?;

  let config = Config::load(args.config.as_deref())?;

  let app = app::App::new(config)?;
  app.run(args.command).await
}
