//! Document intake
//!
//! Checks an upload against the configured extension allow-list and size cap,
//! counts its pages, stores it and returns the [`Document`] to attach to a
//! job. Storing never touches a job; the caller attaches the result under the
//! job's lock.

pub mod page_count;

use bytes::Bytes;
use mailroom_core::models::{Document, DocumentMetadata};
use mailroom_core::{AppError, AppResult, Config};
use mailroom_storage::{Storage, StorageError};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use page_count::{EstimatingPageCounter, PageCounter};

/// A file handed in for a job.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    /// Declared content type. Derived from the extension when absent.
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl DocumentUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }
}

pub(crate) fn storage_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(key) => AppError::not_found("stored document", key),
        StorageError::InvalidKey(key) => AppError::InvalidInput(format!("Invalid storage key: {}", key)),
        other => AppError::Provider(format!("Document storage: {}", other)),
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub struct DocumentIntake {
    storage: Arc<dyn Storage>,
    page_counter: Arc<dyn PageCounter>,
    max_size_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl DocumentIntake {
    pub fn new(
        storage: Arc<dyn Storage>,
        page_counter: Arc<dyn PageCounter>,
        max_size_bytes: u64,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            storage,
            page_counter,
            max_size_bytes,
            allowed_extensions,
        }
    }

    pub fn from_config(config: &Config, storage: Arc<dyn Storage>) -> Self {
        Self::new(
            storage,
            Arc::new(EstimatingPageCounter),
            config.max_document_size_bytes,
            config.document_allowed_extensions.clone(),
        )
    }

    /// Reject uploads that are empty, too large or of a disallowed type.
    pub fn check(&self, upload: &DocumentUpload) -> AppResult<()> {
        if upload.filename.trim().is_empty() {
            return Err(AppError::InvalidInput("Document filename is required".to_string()));
        }
        let extension = extension_of(&upload.filename).ok_or_else(|| {
            AppError::InvalidInput(format!("Document '{}' has no file extension", upload.filename))
        })?;
        if !self.allowed_extensions.contains(&extension) {
            return Err(AppError::InvalidInput(format!(
                "File type .{} is not accepted (allowed: {})",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }
        if upload.data.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Document '{}' is empty",
                upload.filename
            )));
        }
        let size = upload.data.len() as u64;
        if size > self.max_size_bytes {
            return Err(AppError::InvalidInput(format!(
                "Document '{}' is {} bytes, the limit is {} bytes",
                upload.filename, size, self.max_size_bytes
            )));
        }
        Ok(())
    }

    /// Check, measure and store one upload.
    #[tracing::instrument(skip_all, fields(job_id = %job_id, filename = %upload.filename))]
    pub async fn ingest(&self, job_id: Uuid, upload: DocumentUpload) -> AppResult<Document> {
        self.check(&upload)?;
        let start = Instant::now();

        let extension = extension_of(&upload.filename).unwrap_or_default();
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(&extension).to_string());
        let page_count = self.page_counter.count_pages(&upload.filename, &upload.data);
        let byte_size = upload.data.len() as u64;

        let stored = self
            .storage
            .upload(job_id, &upload.filename, &content_type, upload.data)
            .await
            .map_err(storage_error)?;

        tracing::info!(
            key = %stored.key,
            page_count,
            size_bytes = byte_size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Document stored"
        );

        Ok(Document::new(
            DocumentMetadata {
                filename: upload.filename,
                content_type,
                page_count,
                byte_size,
            },
            stored.key,
            stored.url,
        ))
    }

    /// Store several uploads. If any fails, the ones already stored are
    /// deleted again and the first error is returned.
    pub async fn ingest_all(&self, job_id: Uuid, uploads: Vec<DocumentUpload>) -> AppResult<Vec<Document>> {
        for upload in &uploads {
            self.check(upload)?;
        }

        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.ingest(job_id, upload).await {
                Ok(document) => stored.push(document),
                Err(e) => {
                    for document in &stored {
                        self.discard(document).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Delete a stored document's content. Failures are logged, not returned,
    /// since the document is already gone from the job.
    pub async fn discard(&self, document: &Document) {
        if let Err(e) = self.storage.delete(&document.storage_key).await {
            tracing::warn!(
                error = %e,
                key = %document.storage_key,
                "Failed to delete stored document"
            );
        }
    }

    pub async fn read(&self, document: &Document) -> AppResult<Bytes> {
        self.storage
            .download(&document.storage_key)
            .await
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroom_storage::MemoryStorage;

    fn intake(storage: Arc<MemoryStorage>) -> DocumentIntake {
        DocumentIntake::new(
            storage,
            Arc::new(EstimatingPageCounter),
            1024,
            vec!["pdf".to_string(), "docx".to_string()],
        )
    }

    #[tokio::test]
    async fn test_ingest_stores_and_counts_pages() {
        let storage = Arc::new(MemoryStorage::new());
        let intake = intake(storage.clone());
        let pdf = &b"%PDF-1.4 << /Type /Page >> << /Type /Page >> << /Type /Page >>"[..];

        let document = intake
            .ingest(Uuid::new_v4(), DocumentUpload::new("Notice.PDF", pdf))
            .await
            .unwrap();

        assert_eq!(document.page_count, 3);
        assert_eq!(document.content_type, "application/pdf");
        assert_eq!(document.byte_size, pdf.len() as u64);
        assert_eq!(intake.read(&document).await.unwrap(), pdf);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_rejects_disallowed_and_oversized() {
        let storage = Arc::new(MemoryStorage::new());
        let intake = intake(storage.clone());
        let job_id = Uuid::new_v4();

        let result = intake
            .ingest(job_id, DocumentUpload::new("payload.exe", &b"MZ"[..]))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let result = intake
            .ingest(job_id, DocumentUpload::new("big.pdf", vec![b'%'; 2048]))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let result = intake
            .ingest(job_id, DocumentUpload::new("empty.pdf", Bytes::new()))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_ingest_all_checks_every_upload_first() {
        let storage = Arc::new(MemoryStorage::new());
        let intake = intake(storage.clone());

        let result = intake
            .ingest_all(
                Uuid::new_v4(),
                vec![
                    DocumentUpload::new("a.pdf", &b"%PDF-1.4"[..]),
                    DocumentUpload::new("b.txt", &b"hello"[..]),
                ],
            )
            .await;
        assert!(result.is_err());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_discard_removes_content() {
        let storage = Arc::new(MemoryStorage::new());
        let intake = intake(storage.clone());
        let document = intake
            .ingest(Uuid::new_v4(), DocumentUpload::new("a.docx", vec![1u8; 10]))
            .await
            .unwrap();

        intake.discard(&document).await;
        assert!(storage.is_empty().await);
        assert!(matches!(
            intake.read(&document).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
