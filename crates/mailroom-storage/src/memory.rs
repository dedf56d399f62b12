use crate::keys::{generate_storage_key, is_safe_key};
use crate::traits::{Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn check_key(storage_key: &str) -> StorageResult<()> {
        if !is_safe_key(storage_key) {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        job_id: Uuid,
        filename: &str,
        _content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject> {
        let key = generate_storage_key(job_id, filename);
        let size = data.len();
        self.objects.write().await.insert(key.clone(), data);

        tracing::debug!(key = %key, size_bytes = size, "Memory storage upload successful");

        Ok(StoredObject {
            url: format!("memory://{}", key),
            key,
        })
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Bytes> {
        Self::check_key(storage_key)?;
        self.objects
            .read()
            .await
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        Self::check_key(storage_key)?;
        self.objects.write().await.remove(storage_key);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip_and_delete() {
        let storage = MemoryStorage::new();
        let stored = storage
            .upload(Uuid::new_v4(), "notice.pdf", "application/pdf", Bytes::from_static(b"pdf"))
            .await
            .unwrap();

        assert!(stored.url.starts_with("memory://documents/"));
        assert_eq!(storage.download(&stored.key).await.unwrap(), "pdf");
        assert_eq!(storage.len().await, 1);

        storage.delete(&stored.key).await.unwrap();
        assert!(storage.is_empty().await);
        assert!(matches!(
            storage.download(&stored.key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
