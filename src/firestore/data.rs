use super::models::{Document, DocumentMask, FieldTransform, Precondition, ServerValue, Write, WriteOperation};
use super::reference::convert_serde_value_to_firestore_value;
use super::FirestoreError;
use serde::Serialize;
use serde_json::{Map, Value as SerdeValue};
use std::collections::{BTreeSet, HashMap};

/// Field values for a document write, plus the server-side sentinels
/// (`server_timestamp`, `delete_field`) that cannot be expressed as plain values.
///
/// Paths passed to the builder methods are dotted (`"dating.profile"`) and address
/// nested map fields.
///
/// ```rust
/// # use nexus_backend::firestore::data::DocumentData;
/// # use serde_json::json;
/// let data = DocumentData::new()
///     .field("emailSent", json!(true))
///     .server_timestamp("emailSentAt")
///     .delete_field("emailError");
/// assert_eq!(data.mask_paths(), vec!["emailError", "emailSent"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentData {
    fields: Map<String, SerdeValue>,
    written: BTreeSet<String>,
    timestamps: BTreeSet<String>,
    deleted: BTreeSet<String>,
}

impl DocumentData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every top-level key of `value` becomes a written field.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, FirestoreError> {
        match serde_json::to_value(value)? {
            SerdeValue::Object(map) => {
                let mut data = Self::new();
                for (key, value) in map {
                    data.written.insert(quote_segment(&key));
                    data.fields.insert(key, value);
                }
                Ok(data)
            }
            other => Err(FirestoreError::InvalidData(format!(
                "Document data must be an object, got {}",
                other
            ))),
        }
    }

    pub fn field(mut self, path: &str, value: impl Into<SerdeValue>) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        insert_nested(&mut self.fields, &segments, value.into());
        self.written.insert(encode_field_path(path));
        self
    }

    /// Sets the field to the commit time on the server.
    pub fn server_timestamp(mut self, path: &str) -> Self {
        self.timestamps.insert(encode_field_path(path));
        self
    }

    /// Removes the field. Only meaningful for updates.
    pub fn delete_field(mut self, path: &str) -> Self {
        self.deleted.insert(encode_field_path(path));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.timestamps.is_empty() && self.deleted.is_empty()
    }

    /// Field paths an update will touch, sorted.
    pub fn mask_paths(&self) -> Vec<String> {
        self.written.union(&self.deleted).cloned().collect()
    }

    fn firestore_fields(&self) -> Result<HashMap<String, super::models::Value>, FirestoreError> {
        self.fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), convert_serde_value_to_firestore_value(v.clone())?)))
            .collect()
    }

    fn transforms(&self) -> Vec<FieldTransform> {
        self.timestamps
            .iter()
            .map(|path| FieldTransform {
                field_path: path.clone(),
                set_to_server_value: ServerValue::RequestTime,
            })
            .collect()
    }

    pub(crate) fn into_set_write(self, name: String) -> Result<Write, FirestoreError> {
        if !self.deleted.is_empty() {
            return Err(FirestoreError::InvalidData(
                "delete_field can only be used with update".to_string(),
            ));
        }

        Ok(Write {
            operation: WriteOperation::Update(Document {
                name,
                fields: self.firestore_fields()?,
                ..Default::default()
            }),
            update_mask: None,
            update_transforms: self.transforms(),
            current_document: None,
        })
    }

    pub(crate) fn into_update_write(self, name: String) -> Result<Write, FirestoreError> {
        if self.is_empty() {
            return Err(FirestoreError::InvalidData(
                "Update requires at least one field".to_string(),
            ));
        }

        Ok(Write {
            operation: WriteOperation::Update(Document {
                name,
                fields: self.firestore_fields()?,
                ..Default::default()
            }),
            update_mask: Some(DocumentMask {
                field_paths: self.mask_paths(),
            }),
            update_transforms: self.transforms(),
            current_document: Some(Precondition { exists: true }),
        })
    }
}

fn insert_nested(map: &mut Map<String, SerdeValue>, segments: &[&str], value: SerdeValue) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| SerdeValue::Object(Map::new()));
            if !entry.is_object() {
                *entry = SerdeValue::Object(Map::new());
            }
            if let SerdeValue::Object(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

/// Encodes a dotted path for use in masks and transforms.
pub fn encode_field_path(path: &str) -> String {
    path.split('.').map(quote_segment).collect::<Vec<_>>().join(".")
}

fn quote_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    let simple = match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    };

    if simple {
        segment.to_string()
    } else {
        format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
