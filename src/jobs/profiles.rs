//! The nested-profile migration: back up, delete, then verify.
//!
//! Profiles used to live under `dating.profile` and `nexus2.profile` with the country under
//! `dating.contactInfo.countryOfResidence`. The app now reads root-level fields, so the nested
//! copies are backed up to `profile_data_backup/<uid>` and then removed.

use crate::fields::{lookup, truthy};
use crate::firestore::batch::{WriteBatch, MAX_BATCH_WRITES};
use crate::firestore::data::DocumentData;
use crate::firestore::query::Query;
use crate::firestore::FirebaseFirestore;
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::fmt;

pub const BACKUP_COLLECTION: &str = "profile_data_backup";

/// Nested paths removed by the cleanup.
pub const NESTED_FIELDS: &[&str] = &[
    "dating.profile",
    "nexus2.profile",
    "dating.contactInfo.countryOfResidence",
];

const ROOT_FIELDS: &[&str] = &[
    "age",
    "city",
    "country",
    "nationality",
    "profession",
    "educationLevel",
    "churchName",
    "hobbies",
    "desiredQualities",
    "photos",
    "profileUrl",
];

const ROOT_DATA_FIELDS: &[&str] = &["age", "country", "profession", "educationLevel"];
const CRITICAL_FIELDS: &[&str] = &["name", "username", "age"];
const LISTED_MISSING: usize = 10;

fn has_nested_data(user: &Value) -> bool {
    NESTED_FIELDS.iter().any(|path| truthy(lookup(user, path)))
}

/// The backup document for `user`, or `None` when there is nothing nested to keep.
/// `backedUpAt` is added as a server timestamp on write.
pub fn backup_record(uid: &str, user: &Value) -> Option<Value> {
    if !has_nested_data(user) {
        return None;
    }

    let mut original = Map::new();
    for (key, path) in [
        ("datingProfile", "dating.profile"),
        ("datingContactInfoCountry", "dating.contactInfo.countryOfResidence"),
        ("nexus2Profile", "nexus2.profile"),
    ] {
        let value = lookup(user, path);
        if truthy(value) {
            original.insert(key.to_string(), value.cloned().unwrap_or_default());
        }
    }

    let root: Map<String, Value> = ROOT_FIELDS
        .iter()
        .filter_map(|field| Some((field.to_string(), user.get(*field)?.clone())))
        .collect();

    let mut record = Map::new();
    record.insert("uid".to_string(), Value::String(uid.to_string()));
    record.insert("originalData".to_string(), Value::Object(original));
    record.insert("rootFields".to_string(), Value::Object(root));
    Some(Value::Object(record))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupReport {
    pub processed: usize,
    pub backed_up: usize,
    pub errors: usize,
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backup complete")?;
        writeln!(f, "  users processed: {}", self.processed)?;
        writeln!(f, "  backed up:       {}", self.backed_up)?;
        write!(f, "  errors:          {}", self.errors)
    }
}

/// Copies nested profile data of every user into `profile_data_backup`.
/// A failure on one user is counted and the run continues.
pub async fn backup_profiles(firestore: &FirebaseFirestore) -> Result<BackupReport> {
    let users = firestore
        .collection("users")
        .get()
        .await
        .context("failed to list users")?;

    let mut report = BackupReport::default();
    let backups = firestore.collection(BACKUP_COLLECTION);

    for user in users.iter() {
        report.processed += 1;

        let record = match user.data::<Value>() {
            Ok(Some(data)) => backup_record(user.id(), &data),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(uid = %user.id(), error = %e, "unreadable user document");
                report.errors += 1;
                continue;
            }
        };
        let Some(record) = record else {
            continue;
        };

        let written = match DocumentData::from_serializable(&record) {
            Ok(data) => backups.doc(user.id()).set(data.server_timestamp("backedUpAt")).await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                report.backed_up += 1;
                tracing::debug!(uid = %user.id(), "backed up nested profile");
            }
            Err(e) => {
                tracing::warn!(uid = %user.id(), error = %e, "backup failed");
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        backed_up = report.backed_up,
        errors = report.errors,
        "profile backup finished"
    );
    Ok(report)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub processed: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cleanup complete")?;
        writeln!(f, "  users processed: {}", self.processed)?;
        writeln!(f, "  cleaned:         {}", self.cleaned)?;
        writeln!(f, "  already clean:   {}", self.skipped)?;
        write!(f, "  errors:          {}", self.errors)
    }
}

/// The delete-field update for `user`, or `None` when it holds no nested data.
pub fn cleanup_update(user: &Value) -> Option<DocumentData> {
    let present: Vec<&str> = NESTED_FIELDS
        .iter()
        .copied()
        .filter(|path| truthy(lookup(user, path)))
        .collect();

    if present.is_empty() {
        return None;
    }

    Some(
        present
            .into_iter()
            .fold(DocumentData::new(), |data, path| data.delete_field(path)),
    )
}

/// Removes nested profile data from every user, committing in batches of at most
/// [`MAX_BATCH_WRITES`] updates. Refuses to run before a backup exists.
pub async fn cleanup_profiles(firestore: &FirebaseFirestore) -> Result<CleanupReport> {
    let backups = firestore
        .query(Query::new(BACKUP_COLLECTION).limit(1))
        .get()
        .await
        .context("failed to check for backups")?;

    if backups.empty() {
        bail!("no documents in {}; run backup-profiles first", BACKUP_COLLECTION);
    }

    let users = firestore
        .collection("users")
        .get()
        .await
        .context("failed to list users")?;

    let mut report = CleanupReport::default();
    let mut batch = firestore.batch();

    for user in users.iter() {
        report.processed += 1;

        let update = match user.data::<Value>() {
            Ok(Some(data)) => cleanup_update(&data),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(uid = %user.id(), error = %e, "unreadable user document");
                report.errors += 1;
                continue;
            }
        };
        let Some(update) = update else {
            report.skipped += 1;
            continue;
        };

        if let Err(e) = batch.update(user.reference().path(), update) {
            tracing::warn!(uid = %user.id(), error = %e, "could not queue cleanup");
            report.errors += 1;
            continue;
        }

        if batch.len() >= MAX_BATCH_WRITES {
            commit(&mut batch, &mut report).await;
        }
    }

    commit(&mut batch, &mut report).await;

    tracing::info!(
        processed = report.processed,
        cleaned = report.cleaned,
        skipped = report.skipped,
        errors = report.errors,
        "profile cleanup finished"
    );
    Ok(report)
}

async fn commit(batch: &mut WriteBatch<'_>, report: &mut CleanupReport) {
    let pending = batch.len();
    if pending == 0 {
        return;
    }

    match batch.commit().await {
        Ok(_) => {
            report.cleaned += pending;
            tracing::info!(writes = pending, "committed cleanup batch");
        }
        Err(e) => {
            report.errors += pending;
            tracing::error!(writes = pending, error = %e, "cleanup batch failed");
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub total: usize,
    /// Users still holding nested data. Empty after a successful cleanup.
    pub nested: Vec<String>,
    pub with_root_data: usize,
    pub missing_critical: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.nested.is_empty()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total users:                 {}", self.total)?;
        writeln!(f, "Users with nested data:      {}", self.nested.len())?;
        writeln!(f, "Users with root data:        {}", self.with_root_data)?;
        write!(f, "Users missing name/username/age: {}", self.missing_critical.len())?;

        for uid in self.missing_critical.iter().take(LISTED_MISSING) {
            write!(f, "\n  - {}", uid)?;
        }
        if self.missing_critical.len() > LISTED_MISSING {
            write!(f, "\n  ... and {} more", self.missing_critical.len() - LISTED_MISSING)?;
        }

        if self.is_clean() {
            write!(f, "\nCleanup verified: no nested profile data remains")
        } else {
            write!(f, "\nNested data remains; run cleanup-profiles again")
        }
    }
}

/// Audits every user after the cleanup.
pub async fn verify_cleanup(firestore: &FirebaseFirestore) -> Result<VerifyReport> {
    let users = firestore
        .collection("users")
        .get()
        .await
        .context("failed to list users")?;

    let mut report = VerifyReport::default();

    for user in users.iter() {
        let data = user
            .data::<Value>()
            .with_context(|| format!("unreadable user document {}", user.id()))?
            .unwrap_or(Value::Null);

        report.total += 1;

        if has_nested_data(&data) {
            report.nested.push(user.id().to_string());
        }
        if ROOT_DATA_FIELDS.iter().any(|f| truthy(data.get(*f))) {
            report.with_root_data += 1;
        }
        if CRITICAL_FIELDS.iter().any(|f| !truthy(data.get(*f))) {
            report.missing_critical.push(user.id().to_string());
        }
    }

    tracing::info!(
        total = report.total,
        nested = report.nested.len(),
        missing = report.missing_critical.len(),
        "cleanup verified"
    );
    Ok(report)
}
