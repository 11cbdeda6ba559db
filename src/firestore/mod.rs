//! Cloud Firestore client.
//!
//! Mirrors the shape of the Admin SDKs: [`CollectionReference`] and [`DocumentReference`]
//! for addressing documents, [`DocumentData`](data::DocumentData) for writes, and
//! [`WriteBatch`] for atomic multi-document commits. Every write goes through `:commit`.

pub mod batch;
pub mod data;
pub mod models;
pub mod query;
pub mod reference;
pub mod snapshot;


use self::batch::WriteBatch;
use self::query::{ExecutableQuery, Query};
use self::reference::{CollectionReference, DocumentReference};
use crate::core::authorized_client;
use crate::core::middleware::AuthMiddleware;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

const FIRESTORE_V1_API: &str =
    "https://firestore.googleapis.com/v1/projects/{project_id}/databases/(default)/documents";

#[derive(Error, Debug)]
pub enum FirestoreError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Clone)]
pub struct FirebaseFirestore {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseFirestore {
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        let base_url = FIRESTORE_V1_API.replace("{project_id}", &project_id);

        Self {
            client: authorized_client(middleware),
            base_url,
        }
    }

    /// `base_url` is the documents root, `.../projects/<p>/databases/(default)/documents`.
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn collection(&self, collection_path: &str) -> CollectionReference<'_> {
        CollectionReference {
            client: &self.client,
            base_url: self.base_url.clone(),
            path: collection_path.trim_matches('/').to_string(),
        }
    }

    /// `document_path` is slash-separated, e.g. `users/abc`.
    pub fn doc(&self, document_path: &str) -> DocumentReference<'_> {
        DocumentReference {
            client: &self.client,
            base_url: self.base_url.clone(),
            path: document_path.trim_matches('/').to_string(),
        }
    }

    pub fn batch(&self) -> WriteBatch<'_> {
        WriteBatch::new(&self.client, self.base_url.clone())
    }

    pub fn query(&self, query: Query) -> ExecutableQuery<'_> {
        ExecutableQuery::new(&self.client, self.base_url.clone(), query)
    }
}
