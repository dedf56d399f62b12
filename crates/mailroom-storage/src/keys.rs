//! Shared key generation for storage backends.

use uuid::Uuid;

/// Generate a storage key for a document uploaded to `job_id`.
///
/// Characters outside `[A-Za-z0-9._-]` and `..` sequences in the filename are
/// replaced with `_`.
pub fn generate_storage_key(job_id: Uuid, filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.replace("..", "_");
    let sanitized = sanitized.trim_start_matches('.');
    format!("documents/{}/{}-{}", job_id, Uuid::new_v4(), sanitized)
}

/// Reject keys that could escape the storage root.
pub fn is_safe_key(storage_key: &str) -> bool {
    !storage_key.is_empty() && !storage_key.contains("..") && !storage_key.starts_with('/')
}
