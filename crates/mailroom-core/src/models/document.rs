use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata extracted from an upload before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub content_type: String,
    pub page_count: u32,
    pub byte_size: u64,
}

/// Source document uploaded to a job and available for assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub page_count: u32,
    pub byte_size: u64,
    /// Key in the document storage backend.
    pub storage_key: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(metadata: DocumentMetadata, storage_key: String, url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: metadata.filename,
            content_type: metadata.content_type,
            page_count: metadata.page_count,
            byte_size: metadata.byte_size,
            storage_key,
            url,
            uploaded_at: Utc::now(),
        }
    }

    /// File size in megabytes, rounded to one decimal.
    pub fn size_mb(&self) -> f64 {
        (self.byte_size as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0
    }
}
