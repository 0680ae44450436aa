//! Durable storage port
//!
//! A storage backend is one tier of the token cache's read chain: a plain
//! string key/value store such as a file on disk. Operations are synchronous
//! on purpose; cache reads and writes never suspend.

use std::fmt;

/// Errors that can occur in a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the operation (quota, permissions, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// One key/value storage tier.
pub trait StorageBackend: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &str;

    /// Reads a value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read. A missing key is
    /// `Ok(None)`, not an error.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the value cannot be persisted.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a value. Removing a missing key succeeds.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be updated.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageBackend({})", self.name())
    }
}
