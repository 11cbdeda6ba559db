//! Publishes a generated stories or polls document to `cms/<kind>` and bumps its version in
//! `cms/versions`, which is what clients poll to notice new content.

use super::content::ContentKind;
use crate::firestore::data::DocumentData;
use crate::firestore::FirebaseFirestore;
use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

const AUDIENCE_ORDER: [&str; 4] = ["single_never_married", "divorced", "widowed", "married"];

/// Splits `divorced_widowed`, drops duplicates and sorts into canonical order. Unknown keys
/// are kept, logged and sorted first.
pub fn normalize_audiences(audiences: Option<&Value>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let expanded = audiences
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .flat_map(|audience| match audience {
            "divorced_widowed" => vec!["divorced", "widowed"],
            other => vec![other],
        });

    for audience in expanded {
        if !normalized.iter().any(|a| a == audience) {
            normalized.push(audience.to_string());
        }
    }

    for audience in &normalized {
        if !AUDIENCE_ORDER.contains(&audience.as_str()) {
            tracing::warn!(audience = %audience, "unknown audience key");
        }
    }

    normalized.sort_by_key(|audience| AUDIENCE_ORDER.iter().position(|a| a == audience));
    normalized
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub kind: ContentKind,
    pub count: usize,
    pub previous_version: i64,
    pub version: i64,
    pub saved_count: usize,
    /// Id and audiences of the first saved story.
    pub first_story: Option<(String, Vec<String>)>,
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Updated cms/{} with {} item(s)", self.kind, self.count)?;
        writeln!(f, "  version {} -> {}", self.previous_version, self.version)?;
        writeln!(f, "  read back {} item(s)", self.saved_count)?;
        if let Some((story_id, audiences)) = &self.first_story {
            writeln!(f, "  audiences ({}): [{}]", story_id, audiences.join(", "))?;
        }
        write!(f, "Users will see the new {} shortly", self.kind)
    }
}

/// Writes the JSON produced by `generate-content` to Firestore. The kind is taken from the
/// document's `stories` or `polls` key.
pub async fn publish_content(firestore: &FirebaseFirestore, input: &Path) -> Result<PublishReport> {
    let raw = fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;
    let mut content: Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", input.display()))?;

    let kind = if content.get("stories").is_some() {
        ContentKind::Stories
    } else {
        ContentKind::Polls
    };
    let key = kind.to_string();

    let mut items = match content.get_mut(&key).and_then(Value::as_array_mut) {
        Some(items) if !items.is_empty() => std::mem::take(items),
        _ => bail!("no {} found in {}", kind, input.display()),
    };

    if kind == ContentKind::Stories {
        for story in items.iter_mut().filter_map(Value::as_object_mut) {
            let audiences = normalize_audiences(story.get("audiences"));
            story.insert("audiences".to_string(), audiences.into());
        }
    }

    let cms = firestore.collection("cms");
    let versions = cms.doc("versions");
    let snapshot = versions.get().await.context("failed to read cms/versions")?;
    if !snapshot.exists() {
        bail!("cms/versions does not exist");
    }
    let previous_version = snapshot
        .get_field::<Value>(&format!("{}.version", key))?
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let version = previous_version + 1;
    tracing::info!(kind = %kind, previous_version, version, "publishing content");

    let count = items.len();
    let document = cms.doc(&key);
    document
        .set(
            DocumentData::new()
                .field("version", content.get("version").cloned().unwrap_or(Value::Null))
                .field(&key, Value::Array(items)),
        )
        .await
        .with_context(|| format!("failed to write cms/{}", key))?;

    let release_notes = format!(
        "Updated {} - {}",
        key,
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    versions
        .update(
            DocumentData::new()
                .field(&format!("{}.version", key), version)
                .field(&format!("{}.releaseNotes", key), release_notes),
        )
        .await
        .context("failed to bump cms/versions")?;

    let saved: Vec<Value> = document
        .get()
        .await
        .with_context(|| format!("failed to read back cms/{}", key))?
        .get_field(&key)?
        .unwrap_or_default();

    let first_story = match kind {
        ContentKind::Stories => saved.first().map(|story| {
            let story_id = story
                .get("storyId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let audiences = story
                .get("audiences")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
            (story_id, audiences)
        }),
        ContentKind::Polls => None,
    };

    Ok(PublishReport {
        kind,
        count,
        previous_version,
        version,
        saved_count: saved.len(),
        first_story,
    })
}
