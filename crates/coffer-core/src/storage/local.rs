//! Local filesystem storage

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{join_path, validate_path, Storage, StoredFile};
use crate::error::{Error, Result};

/// Storage rooted at a local directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = validate_path(path)?;
        Ok(relative
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part)))
    }
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn list(&self, dir: &str) -> Result<Vec<StoredFile>> {
        let dir_path = self.resolve(dir)?;
        if !dir_path.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir_path).map_err(|e| {
            Error::Storage(format!("Failed to list {}: {}", dir_path.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            files.push(StoredFile {
                path: join_path(dir, &name),
                name,
                modified,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", full.display(), e)))
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| Error::Storage(format!("No parent directory for {}", path)))?;

        fs::create_dir_all(parent).map_err(|e| {
            Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
        })?;

        // Temp file in the target directory so persist is a same-filesystem rename
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
            Error::Storage(format!("Failed to stage {}: {}", full.display(), e))
        })?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&full).map_err(|e| {
            Error::Storage(format!("Failed to replace {}: {}", full.display(), e.error))
        })?;

        debug!("Wrote {} ({} bytes)", full.display(), content.len());
        Ok(())
    }
}
