use super::models::{Document, Value, ValueType};
use super::reference::{convert_fields_to_serde_value, convert_value_to_serde_value, DocumentReference};
use super::FirestoreError;
use serde::de::DeserializeOwned;

/// A document read from Firestore. The document may not exist.
#[derive(Clone)]
pub struct DocumentSnapshot<'a> {
    pub(crate) reference: DocumentReference<'a>,
    pub(crate) document: Option<Document>,
}

impl<'a> DocumentSnapshot<'a> {
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn reference(&self) -> &DocumentReference<'a> {
        &self.reference
    }

    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    pub fn create_time(&self) -> Option<&str> {
        self.document.as_ref().and_then(|d| d.create_time.as_deref())
    }

    pub fn update_time(&self) -> Option<&str> {
        self.document.as_ref().and_then(|d| d.update_time.as_deref())
    }

    /// All fields deserialized into `T`. `Ok(None)` if the document does not exist.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, FirestoreError> {
        match &self.document {
            Some(doc) => {
                let serde_value = convert_fields_to_serde_value(&doc.fields)?;
                Ok(Some(serde_json::from_value(serde_value)?))
            }
            None => Ok(None),
        }
    }

    /// A single field, addressed by a dotted path such as `"fcmToken.token"`.
    ///
    /// `Ok(None)` when the document or any segment of the path is missing.
    pub fn get_field<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FirestoreError> {
        let Some(doc) = &self.document else {
            return Ok(None);
        };

        match lookup(&doc.fields, path) {
            Some(value) => {
                let serde_value = convert_value_to_serde_value(value)?;
                Ok(Some(serde_json::from_value(serde_value)?))
            }
            None => Ok(None),
        }
    }
}

fn lookup<'v>(fields: &'v std::collections::HashMap<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;

    for segment in segments {
        match &current.value_type {
            ValueType::MapValue(map) => current = map.fields.get(segment)?,
            _ => return None,
        }
    }

    Some(current)
}

/// Zero or more document snapshots, from a collection listing or a query.
#[derive(Clone)]
pub struct QuerySnapshot<'a> {
    pub(crate) documents: Vec<DocumentSnapshot<'a>>,
}

impl<'a> QuerySnapshot<'a> {
    pub fn documents(&self) -> &[DocumentSnapshot<'a>] {
        &self.documents
    }

    pub fn empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot<'a>> {
        self.documents.iter()
    }
}

impl<'a> IntoIterator for QuerySnapshot<'a> {
    type Item = DocumentSnapshot<'a>;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}
