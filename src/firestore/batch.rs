use super::data::DocumentData;
use super::models::{CommitRequest, CommitResponse, Write, WriteOperation, WriteResult};
use super::reference::extract_database_path;
use super::FirestoreError;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;

/// Upper bound on writes in a single commit.
pub const MAX_BATCH_WRITES: usize = 500;

/// Sends `writes` as one atomic commit.
pub(crate) async fn commit_writes(
    client: &ClientWithMiddleware,
    base_url: &str,
    writes: Vec<Write>,
) -> Result<Vec<WriteResult>, FirestoreError> {
    let root = base_url.split("/documents").next().unwrap_or(base_url);
    let url = format!("{}/documents:commit", root);

    let request = CommitRequest { writes };

    let response = client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(&request)?)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(FirestoreError::ApiError(format!(
            "Commit failed {}: {}",
            status, text
        )));
    }

    let result: CommitResponse = response.json().await?;
    Ok(result.write_results)
}

/// Writes applied together in one commit.
///
/// ```rust,no_run
/// # use nexus_backend::firestore::{FirebaseFirestore, data::DocumentData};
/// # async fn run(firestore: FirebaseFirestore) -> Result<(), Box<dyn std::error::Error>> {
/// let mut batch = firestore.batch();
/// batch.update("users/a", DocumentData::new().delete_field("nexus2.profile"))?;
/// batch.delete("users/b")?;
/// batch.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct WriteBatch<'a> {
    client: &'a ClientWithMiddleware,
    base_url: String,
    writes: Vec<Write>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(client: &'a ClientWithMiddleware, base_url: String) -> Self {
        Self {
            client,
            base_url,
            writes: Vec::new(),
        }
    }

    fn resource_name(&self, document_path: &str) -> String {
        format!("{}/documents/{}", extract_database_path(&self.base_url), document_path)
    }

    fn push(&mut self, write: Write) -> Result<&mut Self, FirestoreError> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(FirestoreError::InvalidData(format!(
                "A batch holds at most {} writes",
                MAX_BATCH_WRITES
            )));
        }
        self.writes.push(write);
        Ok(self)
    }

    pub fn set(&mut self, document_path: &str, data: DocumentData) -> Result<&mut Self, FirestoreError> {
        let write = data.into_set_write(self.resource_name(document_path))?;
        self.push(write)
    }

    /// Fails at commit time if the document does not exist.
    pub fn update(&mut self, document_path: &str, data: DocumentData) -> Result<&mut Self, FirestoreError> {
        let write = data.into_update_write(self.resource_name(document_path))?;
        self.push(write)
    }

    pub fn delete(&mut self, document_path: &str) -> Result<&mut Self, FirestoreError> {
        let write = Write {
            operation: WriteOperation::Delete(self.resource_name(document_path)),
            update_mask: None,
            update_transforms: Vec::new(),
            current_document: None,
        };
        self.push(write)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commits the pending writes and leaves the batch empty for reuse.
    pub async fn commit(&mut self) -> Result<Vec<WriteResult>, FirestoreError> {
        if self.writes.is_empty() {
            return Ok(Vec::new());
        }

        let writes = std::mem::take(&mut self.writes);
        commit_writes(self.client, &self.base_url, writes).await
    }
}
