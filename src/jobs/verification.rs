//! Inspection and repair of the dating-profile verification queue.
//!
//! The admin app lists users whose `dating.verificationStatus` is `pending`, newest
//! `dating.verificationQueuedAt` first, and reviews the photo and audio URLs in
//! `dating.reviewPack`. Profiles queued before those fields existed never show up there.

use crate::fields::{lookup, str_at, text, text_or, truthy};
use crate::firestore::data::DocumentData;
use crate::firestore::models::{Direction, FieldOperator};
use crate::firestore::query::Query;
use crate::firestore::FirebaseFirestore;
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::fmt;

pub const PENDING: &str = "pending";

const STATUS_FIELD: &str = "dating.verificationStatus";
const QUEUED_AT_FIELD: &str = "dating.verificationQueuedAt";
const MAX_REVIEW_PHOTOS: usize = 4;
const MAX_REVIEW_AUDIO: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProfile {
    pub uid: String,
    pub name: String,
    pub queued_at: Option<String>,
}

impl fmt::Display for PendingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) queued {}",
            self.name,
            self.uid,
            self.queued_at.as_deref().unwrap_or("never")
        )
    }
}

fn write_queue(f: &mut fmt::Formatter<'_>, queue: &[PendingProfile]) -> fmt::Result {
    write!(f, "Pending verification queue: {}", queue.len())?;
    for profile in queue {
        write!(f, "\n  - {}", profile)?;
    }
    Ok(())
}

/// The newest `limit` pending profiles, as the admin app orders them.
pub async fn pending_queue(firestore: &FirebaseFirestore, limit: i32) -> Result<Vec<PendingProfile>> {
    let query = Query::new("users")
        .where_filter(STATUS_FIELD, FieldOperator::Equal, PENDING)?
        .order_by(QUEUED_AT_FIELD, Direction::Descending)
        .limit(limit);

    let snapshot = firestore
        .query(query)
        .get()
        .await
        .context("failed to query the verification queue")?;

    snapshot
        .iter()
        .map(|doc| -> Result<PendingProfile> {
            let data = doc.data::<Value>()?.unwrap_or(Value::Null);
            Ok(PendingProfile {
                uid: doc.id().to_string(),
                name: text(&data, "username")
                    .or_else(|| text(&data, "name"))
                    .unwrap_or_else(|| "Unknown".to_string()),
                queued_at: text(&data, QUEUED_AT_FIELD),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub status: Option<String>,
    pub queued_at: Option<String>,
    pub is_admin: bool,
    pub review_photos: usize,
    pub review_audio: usize,
    /// Set when `--fix` queued a profile that had no status.
    pub fixed: bool,
    pub queue: Vec<PendingProfile>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "User {}", self.uid)?;
        writeln!(f, "  username:     {}", self.username)?;
        writeln!(f, "  email:        {}", self.email)?;
        writeln!(f, "  status:       {}", self.status.as_deref().unwrap_or("NOT SET"))?;
        writeln!(f, "  queued at:    {}", self.queued_at.as_deref().unwrap_or("NOT SET"))?;
        writeln!(f, "  admin:        {}", self.is_admin)?;
        writeln!(
            f,
            "  review pack:  {} photo(s), {} audio",
            self.review_photos, self.review_audio
        )?;
        if self.fixed {
            writeln!(f, "  set status to pending")?;
        }
        write_queue(f, &self.queue)
    }
}

fn array_len(value: &Value, path: &str) -> usize {
    lookup(value, path)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Reports the verification state of one user. With `fix`, a profile with no status is
/// queued as pending.
pub async fn verification_status(firestore: &FirebaseFirestore, uid: &str, fix: bool) -> Result<StatusReport> {
    let doc = firestore.collection("users").doc(uid);
    let Some(data) = doc.get().await?.data::<Value>()? else {
        bail!("user {} not found", uid);
    };

    let status = str_at(&data, STATUS_FIELD).map(str::to_string);
    let mut report = StatusReport {
        uid: uid.to_string(),
        username: text_or(&data, "username", "N/A"),
        email: text_or(&data, "email", "N/A"),
        status: status.clone(),
        queued_at: text(&data, QUEUED_AT_FIELD),
        is_admin: truthy(data.get("isAdmin")),
        review_photos: array_len(&data, "dating.reviewPack.photoUrls"),
        review_audio: array_len(&data, "dating.reviewPack.audioUrls"),
        fixed: false,
        queue: Vec::new(),
    };

    if fix && status.is_none() {
        doc.update(
            DocumentData::new()
                .field(STATUS_FIELD, PENDING)
                .server_timestamp(QUEUED_AT_FIELD),
        )
        .await
        .with_context(|| format!("failed to queue users/{}", uid))?;

        tracing::info!(uid, "queued profile for verification");
        report.status = Some(PENDING.to_string());
        report.fixed = true;
    }

    report.queue = pending_queue(firestore, 10).await?;
    Ok(report)
}

fn first_present(user: &Value, paths: &[&str]) -> Option<Value> {
    paths
        .iter()
        .find_map(|path| lookup(user, path).filter(|v| truthy(Some(v))))
        .cloned()
}

/// Review pack for a profile queued before review packs existed: photos from
/// `dating.photos`, audio from `audio.audioNUrl` falling back to `dating.audioNUrl`.
pub fn legacy_review_pack(user: &Value) -> Value {
    let photos: Vec<Value> = lookup(user, "dating.photos")
        .and_then(Value::as_array)
        .map(|photos| photos.iter().filter(|p| truthy(Some(p))).cloned().collect())
        .unwrap_or_default();

    let audio: Vec<Value> = (1..=3)
        .filter_map(|n| {
            first_present(
                user,
                &[
                    format!("audio.audio{}Url", n).as_str(),
                    format!("dating.audio{}Url", n).as_str(),
                ],
            )
        })
        .collect();

    json!({ "photoUrls": photos, "audioUrls": audio })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub pending: usize,
    pub fixed: usize,
    pub already_fixed: usize,
    pub errors: usize,
    pub queue: Vec<PendingProfile>,
}

impl fmt::Display for FixReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pending profiles: {}", self.pending)?;
        writeln!(f, "  fixed:         {}", self.fixed)?;
        writeln!(f, "  already fixed: {}", self.already_fixed)?;
        writeln!(f, "  errors:        {}", self.errors)?;
        write_queue(f, &self.queue)
    }
}

fn needs_fix(user: &Value) -> bool {
    let missing = |path: &str| matches!(lookup(user, path), None | Some(Value::Null));
    missing(QUEUED_AT_FIELD) || missing("dating.reviewPack")
}

/// Gives every pending profile without a queue timestamp or review pack both, and mirrors
/// gender and relationship status into `dating`.
pub async fn fix_pending_profiles(firestore: &FirebaseFirestore) -> Result<FixReport> {
    let query = Query::new("users").where_filter(STATUS_FIELD, FieldOperator::Equal, PENDING)?;
    let pending = firestore
        .query(query)
        .get()
        .await
        .context("failed to query pending profiles")?;

    let mut report = FixReport {
        pending: pending.size(),
        ..Default::default()
    };

    for doc in pending.iter() {
        let data = doc.data::<Value>()?.unwrap_or(Value::Null);
        if !needs_fix(&data) {
            report.already_fixed += 1;
            continue;
        }

        let mut update = DocumentData::new()
            .server_timestamp(QUEUED_AT_FIELD)
            .field("dating.reviewPack", legacy_review_pack(&data))
            .server_timestamp("dating.reviewPack.submittedAt");

        if let Some(gender) = first_present(&data, &["nexus2.gender", "gender"]) {
            update = update.field("dating.gender", gender);
        }
        if let Some(status) = first_present(&data, &["nexus2.relationshipStatus", "relationshipStatus"]) {
            update = update.field("dating.relationshipStatus", status);
        }

        match doc.reference().update(update).await {
            Ok(()) => {
                tracing::info!(uid = %doc.id(), "fixed pending profile");
                report.fixed += 1;
            }
            Err(e) => {
                tracing::warn!(uid = %doc.id(), error = %e, "could not fix pending profile");
                report.errors += 1;
            }
        }
    }

    report.queue = pending_queue(firestore, 50).await?;
    Ok(report)
}

/// Non-blank strings of `first` then `second`, without duplicates, at most `max`.
fn merged_urls(user: &Value, first: &str, second: &str, max: usize) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let candidates = [first, second]
        .into_iter()
        .filter_map(|path| lookup(user, path).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str);

    for url in candidates {
        if !url.trim().is_empty() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }

    urls.truncate(max);
    urls
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeueReport {
    pub uid: String,
    pub photos: Vec<String>,
    pub audio: Vec<String>,
    pub queue: Vec<PendingProfile>,
}

impl fmt::Display for RequeueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requeued {} for verification", self.uid)?;
        writeln!(
            f,
            "  review pack: {} photo(s), {} audio",
            self.photos.len(),
            self.audio.len()
        )?;
        write_queue(f, &self.queue)
    }
}

/// Rebuilds one user's review pack from their root and dating media and puts them back in
/// the queue.
pub async fn requeue_verification(firestore: &FirebaseFirestore, uid: &str) -> Result<RequeueReport> {
    let doc = firestore.collection("users").doc(uid);
    let Some(data) = doc.get().await?.data::<Value>()? else {
        bail!("user {} not found", uid);
    };

    let photos = merged_urls(&data, "photos", "dating.photos", MAX_REVIEW_PHOTOS);
    let audio = merged_urls(&data, "audioPrompts", "dating.audioPrompts", MAX_REVIEW_AUDIO);

    let update = DocumentData::new()
        .field(STATUS_FIELD, PENDING)
        .server_timestamp(QUEUED_AT_FIELD)
        .field(
            "dating.reviewPack",
            json!({ "photoUrls": photos, "audioUrls": audio }),
        )
        .server_timestamp("dating.reviewPack.submittedAt")
        .field("dating.gender", first_present(&data, &["gender"]).unwrap_or(Value::Null))
        .field(
            "dating.relationshipStatus",
            first_present(&data, &["nexus2.relationshipStatus"]).unwrap_or(Value::Null),
        );

    doc.update(update)
        .await
        .with_context(|| format!("failed to requeue users/{}", uid))?;
    tracing::info!(uid, photos = photos.len(), audio = audio.len(), "requeued profile");

    Ok(RequeueReport {
        uid: uid.to_string(),
        photos,
        audio,
        queue: pending_queue(firestore, 10).await?,
    })
}
