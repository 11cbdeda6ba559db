use super::models::{
    CollectionSelector, CompositeFilter, CompositeOperator, Direction, FieldFilter, FieldOperator,
    FieldReference, Filter, Order, RunQueryRequest, RunQueryResponse, StructuredQuery,
};
use super::reference::{convert_serde_value_to_firestore_value, DocumentReference};
use super::snapshot::{DocumentSnapshot, QuerySnapshot};
use super::FirestoreError;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;

/// A query over one top-level collection, independent of any client.
#[derive(Clone, Debug)]
pub struct Query {
    pub(crate) query: StructuredQuery,
}

impl Query {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: collection_id.into(),
                }],
                ..Default::default()
            },
        }
    }

    /// Adds a field filter. Successive filters are AND-ed.
    pub fn where_filter<T: Serialize>(
        mut self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        let value = convert_serde_value_to_firestore_value(serde_json::to_value(value)?)?;

        let filter = Filter::FieldFilter(FieldFilter {
            field: FieldReference {
                field_path: field.to_string(),
            },
            op,
            value,
        });

        self.query.where_clause = Some(match self.query.where_clause.take() {
            None => filter,
            Some(Filter::CompositeFilter(mut composite)) => {
                composite.filters.push(filter);
                Filter::CompositeFilter(composite)
            }
            Some(existing) => Filter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: vec![existing, filter],
            }),
        });

        Ok(self)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.query.order_by.push(Order {
            field: FieldReference {
                field_path: field.to_string(),
            },
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.query.limit = Some(limit);
        self
    }
}

/// A `Query` bound to a client, ready to run.
#[derive(Clone)]
pub struct ExecutableQuery<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) base_url: String,
    pub(crate) query: Query,
}

impl<'a> ExecutableQuery<'a> {
    pub(crate) fn new(client: &'a ClientWithMiddleware, base_url: String, query: Query) -> Self {
        Self {
            client,
            base_url,
            query,
        }
    }

    pub async fn get(&self) -> Result<QuerySnapshot<'a>, FirestoreError> {
        let url = format!("{}:runQuery", self.base_url);

        let request = RunQueryRequest {
            structured_query: self.query.query.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FirestoreError::ApiError(format!(
                "Run query failed {}: {}",
                status, text
            )));
        }

        // One entry per result; entries without a document only carry progress.
        let responses: Vec<RunQueryResponse> = response.json().await?;

        let documents = responses
            .into_iter()
            .filter_map(|res| res.document)
            .map(|doc| {
                let path = doc
                    .name
                    .split_once("/documents/")
                    .map(|(_, relative)| relative.to_string())
                    .unwrap_or_else(|| doc.id().to_string());

                DocumentSnapshot {
                    reference: DocumentReference {
                        client: self.client,
                        base_url: self.base_url.clone(),
                        path,
                    },
                    document: Some(doc),
                }
            })
            .collect();

        Ok(QuerySnapshot { documents })
    }
}
