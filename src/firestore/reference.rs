use super::batch::commit_writes;
use super::data::DocumentData;
use super::models::{ArrayValue, Document, ListDocumentsResponse, MapValue, Value, ValueType, Write, WriteOperation};
use super::snapshot::{DocumentSnapshot, QuerySnapshot};
use super::FirestoreError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::Error;
use serde_json::map::Map;
use serde_json::Value as SerdeValue;
use std::collections::HashMap;

const AUTO_ID_LENGTH: usize = 20;
const LIST_PAGE_SIZE: &str = "300";

/// Converts Firestore's typed field map to a plain JSON object.
pub fn convert_fields_to_serde_value(
    fields: &HashMap<String, Value>,
) -> Result<SerdeValue, FirestoreError> {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key.clone(), convert_value_to_serde_value(value)?);
    }
    Ok(SerdeValue::Object(map))
}

pub fn convert_value_to_serde_value(value: &Value) -> Result<SerdeValue, FirestoreError> {
    Ok(match &value.value_type {
        ValueType::StringValue(s) => SerdeValue::String(s.clone()),
        ValueType::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                <serde_json::Error as Error>::custom(format!(
                    "Failed to parse integer string '{}': {}",
                    s, e
                ))
            })?;
            SerdeValue::Number(i.into())
        }
        ValueType::DoubleValue(d) => serde_json::Number::from_f64(*d)
            .map(SerdeValue::Number)
            .unwrap_or(SerdeValue::Null), // NaN and infinities have no JSON form
        ValueType::BooleanValue(b) => SerdeValue::Bool(*b),
        ValueType::MapValue(map_value) => convert_fields_to_serde_value(&map_value.fields)?,
        ValueType::ArrayValue(array_value) => SerdeValue::Array(
            array_value
                .values
                .iter()
                .map(convert_value_to_serde_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        ValueType::NullValue(_) => SerdeValue::Null,
        ValueType::TimestampValue(s) => SerdeValue::String(s.clone()),
        ValueType::GeoPointValue(gp) => {
            serde_json::json!({ "latitude": gp.latitude, "longitude": gp.longitude })
        }
        ValueType::BytesValue(s) | ValueType::ReferenceValue(s) => SerdeValue::String(s.clone()),
    })
}

/// A document's fields as a JSON object.
pub fn document_to_json(document: &Document) -> Result<SerdeValue, FirestoreError> {
    convert_fields_to_serde_value(&document.fields)
}

pub fn convert_serde_value_to_firestore_value(value: SerdeValue) -> Result<Value, FirestoreError> {
    let value_type = match value {
        SerdeValue::Null => ValueType::NullValue(()),
        SerdeValue::Bool(b) => ValueType::BooleanValue(b),
        SerdeValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                ValueType::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                ValueType::DoubleValue(f)
            } else {
                return Err(FirestoreError::InvalidData(format!(
                    "Unsupported number type: {}",
                    n
                )));
            }
        }
        SerdeValue::String(s) => ValueType::StringValue(s),
        SerdeValue::Array(a) => ValueType::ArrayValue(ArrayValue {
            values: a
                .into_iter()
                .map(convert_serde_value_to_firestore_value)
                .collect::<Result<Vec<_>, _>>()?,
        }),
        SerdeValue::Object(o) => {
            let mut fields = HashMap::new();
            for (k, v) in o {
                fields.insert(k, convert_serde_value_to_firestore_value(v)?);
            }
            ValueType::MapValue(MapValue { fields })
        }
    };
    Ok(Value { value_type })
}

/// Resource name of the database, e.g. `projects/p/databases/(default)`, taken from
/// the documents root URL.
pub(crate) fn extract_database_path(documents_url: &str) -> String {
    let start = documents_url.find("projects/").unwrap_or(0);
    let trimmed = &documents_url[start..];
    trimmed
        .split("/documents")
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

pub(crate) fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Clone)]
pub struct DocumentReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    /// Documents root URL, `.../databases/(default)/documents`.
    pub(crate) base_url: String,
    /// Slash-separated path relative to the root, e.g. `users/abc`.
    pub(crate) path: String,
}

impl<'a> DocumentReference<'a> {
    pub fn id(&self) -> &str {
        last_segment(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full resource name, as used in commit requests.
    pub fn name(&self) -> String {
        format!("{}/documents/{}", extract_database_path(&self.base_url), self.path)
    }

    pub fn collection(&self, collection_id: &str) -> CollectionReference<'a> {
        CollectionReference {
            client: self.client,
            base_url: self.base_url.clone(),
            path: format!("{}/{}", self.path, collection_id),
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.path)
    }

    /// Reads the document. A missing document yields a snapshot whose `exists()` is false.
    pub async fn get(&self) -> Result<DocumentSnapshot<'a>, FirestoreError> {
        let response = self.client.get(self.url()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot {
                reference: self.clone(),
                document: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FirestoreError::ApiError(format!(
                "Get document failed {}: {}",
                status, text
            )));
        }

        let document: Document = response.json().await?;
        Ok(DocumentSnapshot {
            reference: self.clone(),
            document: Some(document),
        })
    }

    /// Overwrites the document, creating it if needed.
    pub async fn set(&self, data: DocumentData) -> Result<(), FirestoreError> {
        let write = data.into_set_write(self.name())?;
        commit_writes(self.client, &self.base_url, vec![write]).await?;
        Ok(())
    }

    /// Updates the listed fields. Fails if the document does not exist.
    pub async fn update(&self, data: DocumentData) -> Result<(), FirestoreError> {
        let write = data.into_update_write(self.name())?;
        commit_writes(self.client, &self.base_url, vec![write]).await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), FirestoreError> {
        let write = Write {
            operation: WriteOperation::Delete(self.name()),
            update_mask: None,
            update_transforms: Vec::new(),
            current_document: None,
        };
        commit_writes(self.client, &self.base_url, vec![write]).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CollectionReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) base_url: String,
    pub(crate) path: String,
}

impl<'a> CollectionReference<'a> {
    pub fn id(&self) -> &str {
        last_segment(&self.path)
    }

    pub fn doc(&self, document_id: &str) -> DocumentReference<'a> {
        DocumentReference {
            client: self.client,
            base_url: self.base_url.clone(),
            path: format!("{}/{}", self.path, document_id),
        }
    }

    /// A reference to a new document with a random 20-character id.
    pub fn new_doc(&self) -> DocumentReference<'a> {
        self.doc(&auto_id())
    }

    /// Reads every document of the collection, following page tokens.
    pub async fn get(&self) -> Result<QuerySnapshot<'a>, FirestoreError> {
        let url = format!("{}/{}", self.base_url, self.path);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self.client.get(&url).query(&query).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(FirestoreError::ApiError(format!(
                    "List documents failed {}: {}",
                    status, text
                )));
            }

            let page: ListDocumentsResponse = response.json().await?;
            for document in page.documents {
                documents.push(self.snapshot_of(document));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(collection = %self.path, count = documents.len(), "listed collection");
        Ok(QuerySnapshot { documents })
    }

    fn snapshot_of(&self, document: Document) -> DocumentSnapshot<'a> {
        DocumentSnapshot {
            reference: self.doc(document.id()),
            document: Some(document),
        }
    }
}
