//! In-process storage

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{validate_path, Storage, StoredFile};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Storage backed by a map of path → bytes
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Entry>>,
    read_only: RwLock<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file with the current time as its mtime
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.insert_with_mtime(path, content, Utc::now());
    }

    pub fn insert_with_mtime(&self, path: &str, content: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(
                path.trim_matches('/').to_string(),
                Entry {
                    content: content.into(),
                    modified,
                },
            );
        }
    }

    /// Content of a file, if present
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .ok()?
            .get(path.trim_matches('/'))
            .map(|e| e.content.clone())
    }

    /// Every stored path, sorted
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every subsequent write fail
    pub fn set_read_only(&self, read_only: bool) {
        if let Ok(mut flag) = self.read_only.write() {
            *flag = read_only;
        }
    }

    fn lock_error() -> Error {
        Error::Storage("Memory storage lock poisoned".to_string())
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn list(&self, dir: &str) -> Result<Vec<StoredFile>> {
        let dir = validate_path(dir)?;
        let prefix = format!("{}/", dir);
        let files = self.files.read().map_err(|_| Self::lock_error())?;

        Ok(files
            .iter()
            .filter_map(|(path, entry)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(StoredFile {
                    name: name.to_string(),
                    path: path.clone(),
                    modified: Some(entry.modified),
                })
            })
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let files = self.files.read().map_err(|_| Self::lock_error())?;
        files
            .get(path)
            .map(|e| e.content.clone())
            .ok_or_else(|| Error::Storage(format!("No such file: {}", path)))
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        if *self.read_only.read().map_err(|_| Self::lock_error())? {
            return Err(Error::Storage(format!("Storage is read-only: {}", path)));
        }
        let mut files = self.files.write().map_err(|_| Self::lock_error())?;
        files.insert(
            path.to_string(),
            Entry {
                content: content.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}
