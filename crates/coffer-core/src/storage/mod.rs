//! Storage boundary for raw exports and generated outputs
//!
//! Paths are `/`-separated and relative to the storage root, e.g.
//! `finance/raw/2026/zen_2026-02-01.csv`.
//!
//! # Architecture
//!
//! - `Storage` trait: list / read / create-or-replace
//! - `LocalStorage` keeps files under a directory and replaces them atomically
//! - `MemoryStorage` keeps files in-process (tests, embedding)

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// A file as reported by [`Storage::list`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    /// File name without directory
    pub name: String,
    /// Path relative to the storage root
    pub path: String,
    /// Last modification time, when the backend knows it
    pub modified: Option<DateTime<Utc>>,
}

/// Trait for storage backends
pub trait Storage: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &str;

    /// Files directly inside `dir`, sorted by name. A missing directory lists
    /// as empty.
    fn list(&self, dir: &str) -> Result<Vec<StoredFile>>;

    /// Full content of a file
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file, creating parent directories as needed
    fn write(&self, path: &str, content: &[u8]) -> Result<()>;
}

/// Reject absolute paths and parent traversal
pub(crate) fn validate_path(path: &str) -> Result<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty()
        || path.starts_with('/')
        || trimmed.split('/').any(|part| part == ".." || part.is_empty())
    {
        return Err(Error::Storage(format!("Invalid storage path: {}", path)));
    }
    Ok(trimmed)
}

/// Join a directory and a file name with `/`
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
