use super::FunctionError;
use crate::firestore::models::Document;
use crate::firestore::reference::document_to_json;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const EVENT_TYPE_PREFIX: &str = "google.cloud.firestore.document.v1.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    /// Maps a CloudEvents `ce-type` such as `google.cloud.firestore.document.v1.created`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type.strip_prefix(EVENT_TYPE_PREFIX)? {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "deleted" => Some(EventKind::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    value: Option<Document>,
    old_value: Option<Document>,
}

/// A document lifecycle event as delivered to the receiver.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub kind: EventKind,
    /// Document path relative to the database root, e.g. `users/abc`.
    pub path: String,
    /// The document after the change. Absent for deletions.
    pub value: Option<Document>,
    /// The document before the change. Absent for creations.
    pub old_value: Option<Document>,
}

impl DocumentEvent {
    /// Parses a CloudEvent delivered in binary mode with a JSON body.
    pub fn from_cloud_event(
        event_type: &str,
        subject: &str,
        body: &[u8],
    ) -> Result<Self, FunctionError> {
        let kind = EventKind::from_event_type(event_type)
            .ok_or_else(|| FunctionError::Event(format!("Unsupported event type {}", event_type)))?;

        let path = subject
            .strip_prefix("documents/")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FunctionError::Event(format!("Unexpected subject {}", subject)))?
            .to_string();

        let body: EventBody = if body.iter().all(u8::is_ascii_whitespace) {
            EventBody::default()
        } else {
            serde_json::from_slice(body)
                .map_err(|e| FunctionError::Event(format!("Malformed event body: {}", e)))?
        };

        Ok(Self {
            kind,
            path,
            value: body.value,
            old_value: body.old_value,
        })
    }

    /// Fields after the change as JSON; an empty object when absent.
    pub fn data(&self) -> Result<Value, FunctionError> {
        fields_of(self.value.as_ref())
    }

    /// Fields before the change as JSON; an empty object when absent.
    pub fn old_data(&self) -> Result<Value, FunctionError> {
        fields_of(self.old_value.as_ref())
    }
}

fn fields_of(document: Option<&Document>) -> Result<Value, FunctionError> {
    match document {
        Some(doc) => Ok(document_to_json(doc)?),
        None => Ok(Value::Object(Default::default())),
    }
}

/// Matches `path` against a pattern like `users/{userId}/notifications/{notificationId}`,
/// returning the captured wildcards.
pub fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();

    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (expected, actual) in pattern_segments.iter().zip(path_segments.iter()) {
        if actual.is_empty() {
            return None;
        }
        match expected.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                params.insert(name.to_string(), actual.to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }

    Some(params)
}
