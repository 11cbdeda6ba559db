use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use nexus_backend::auth::verifier::IdTokenVerifier;
use nexus_backend::config::Config;
use nexus_backend::functions::subscriptions::check_expiring_subscriptions;
use nexus_backend::jobs::{self, AdminTarget};
use nexus_backend::mail::{mailer_from_config, UnconfiguredMailer};
use nexus_backend::server::{self, AppState};
use nexus_backend::FirebaseApp;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nexus", version)]
/// Backend and operator tools for the Nexus app.
struct Cli {
    /// Path to a TOML config file, `nexus.toml` in the working directory by default.
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP endpoint and the trigger receiver.
    Serve,
    /// Copy nested profile data into `profile_data_backup`.
    BackupProfiles,
    /// Delete nested profile data. Needs a backup first.
    CleanupProfiles,
    /// Check that no nested profile data remains.
    VerifyCleanup,
    /// Grant or revoke the `admin` custom claim.
    SetAdmin {
        /// Email address or uid of the account.
        #[arg(conflicts_with_all = ["email", "uid"])]
        target: Option<String>,
        #[arg(long, conflicts_with = "uid")]
        email: Option<String>,
        #[arg(long)]
        uid: Option<String>,
        /// `false` revokes the claim.
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
        admin: bool,
    },
    /// Show the verification state of a profile.
    VerificationStatus {
        uid: String,
        /// Queue the profile as pending when it has no status.
        #[arg(long)]
        fix: bool,
    },
    /// Add queue timestamps and review packs to pending profiles missing them.
    FixPendingProfiles,
    /// Rebuild a profile's review pack and put it back in the queue.
    RequeueVerification { uid: String },
    /// Convert a story or poll text file into its JSON document.
    GenerateContent {
        /// File whose name contains "story" or "poll".
        input: PathBuf,
    },
    /// Publish a generated JSON file to `cms/<kind>` and bump its version.
    PublishContent {
        /// Output of `generate-content`.
        input: PathBuf,
    },
    /// Run the expiring-subscription check once.
    CheckSubscriptions,
}

fn admin_target(target: Option<String>, email: Option<String>, uid: Option<String>) -> Result<AdminTarget> {
    match (target, email, uid) {
        (Some(target), None, None) => Ok(AdminTarget::parse(&target)),
        (None, Some(email), None) => Ok(AdminTarget::Email(email)),
        (None, None, Some(uid)) => Ok(AdminTarget::Uid(uid)),
        _ => bail!("give one of <TARGET>, --email or --uid"),
    }
}

async fn firebase_app(config: &Config) -> Result<FirebaseApp> {
    let key = config.service_account_key().await?;
    Ok(FirebaseApp::new(key))
}

async fn serve(config: Config) -> Result<()> {
    let app = firebase_app(&config).await?;
    let project_id = app
        .project_id()
        .context("service account key has no project_id")?
        .to_string();

    let mailer = mailer_from_config(&config.mail).context("failed to set up SMTP")?;
    let services = app.services(mailer, config.mail.clone());

    if config.scheduler.daily_subscription_check {
        server::spawn_daily_subscription_check(services.clone());
        tracing::info!("daily subscription check scheduled");
    }

    let state = AppState {
        services,
        verifier: Arc::new(IdTokenVerifier::new(project_id)),
        spaces: config.spaces.clone(),
    };

    server::serve(&config.http, state).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::GenerateContent { input } => {
            let today = chrono::Utc::now().date_naive();
            println!("{}", jobs::generate_content(&input, today)?);
        }
        Command::PublishContent { input } => {
            let app = firebase_app(&config).await?;
            println!("{}", jobs::publish_content(&app.firestore(), &input).await?);
        }
        Command::BackupProfiles => {
            let app = firebase_app(&config).await?;
            println!("{}", jobs::backup_profiles(&app.firestore()).await?);
        }
        Command::CleanupProfiles => {
            let app = firebase_app(&config).await?;
            println!("{}", jobs::cleanup_profiles(&app.firestore()).await?);
        }
        Command::VerifyCleanup => {
            let app = firebase_app(&config).await?;
            println!("{}", jobs::verify_cleanup(&app.firestore()).await?);
        }
        Command::SetAdmin {
            target,
            email,
            uid,
            admin,
        } => {
            let target = admin_target(target, email, uid)?;
            let app = firebase_app(&config).await?;
            println!(
                "{}",
                jobs::set_admin(&app.auth(), &app.firestore(), &target, admin).await?
            );
        }
        Command::VerificationStatus { uid, fix } => {
            let app = firebase_app(&config).await?;
            println!(
                "{}",
                jobs::verification_status(&app.firestore(), &uid, fix).await?
            );
        }
        Command::FixPendingProfiles => {
            let app = firebase_app(&config).await?;
            println!("{}", jobs::fix_pending_profiles(&app.firestore()).await?);
        }
        Command::RequeueVerification { uid } => {
            let app = firebase_app(&config).await?;
            println!(
                "{}",
                jobs::requeue_verification(&app.firestore(), &uid).await?
            );
        }
        Command::CheckSubscriptions => {
            let app = firebase_app(&config).await?;
            // The check only queues notifications.
            let services = app.services(Arc::new(UnconfiguredMailer), config.mail.clone());
            let queued = check_expiring_subscriptions(&services, chrono::Utc::now()).await?;
            println!("Queued {} subscription reminder(s)", queued);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run(Cli::parse()).await
}
