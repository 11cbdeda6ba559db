//! Operator jobs behind the `nexus` subcommands.
//!
//! Each job returns a report that implements `Display`; the CLI prints it. Failures that
//! stop a job are `anyhow` errors with context, per-document failures are counted in the
//! report and logged.

pub mod admin;
pub mod content;
pub mod profiles;
pub mod publish;
pub mod verification;


pub use admin::{set_admin, AdminReport, AdminTarget};
pub use content::{generate_content, ContentReport};
pub use profiles::{backup_profiles, cleanup_profiles, verify_cleanup, BackupReport, CleanupReport, VerifyReport};
pub use publish::{publish_content, PublishReport};
pub use verification::{
    fix_pending_profiles, requeue_verification, verification_status, FixReport, RequeueReport, StatusReport,
};
