//! Mailroom Storage Library
//!
//! Storage abstraction for uploaded job documents, with a local-filesystem
//! backend and an in-memory backend.
//!
//! # Storage key format
//!
//! All backends use the same key layout: `documents/{job_id}/{id}-{filename}`,
//! where `id` is a fresh UUID so re-uploading a file never overwrites an
//! earlier one. Keys must not contain `..` or a leading `/`.

pub mod factory;
pub(crate) mod keys;
pub mod local;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use local::LocalStorage;
pub use mailroom_core::StorageBackend;
pub use memory::MemoryStorage;
pub use traits::{Storage, StorageError, StorageResult, StoredObject};
