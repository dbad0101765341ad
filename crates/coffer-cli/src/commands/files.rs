//! Raw file discovery command

use std::path::Path;

use anyhow::{Context, Result};
use coffer_core::sources::raw_dir;
use coffer_core::{collect_raw_files, LocalStorage, RawFileSet};

pub fn cmd_files(root: &Path, year: i32) -> Result<()> {
    let set = list_files(root, year)?;
    let dir = raw_dir(year);

    if set.is_empty() && set.unrecognized.is_empty() {
        println!("📭 No raw files in {}/", dir);
        return Ok(());
    }

    println!("📂 {}/", dir);
    for file in set.effective_files() {
        println!("   {:<18} {}", file.source.as_str(), file.name);
    }
    for file in &set.superseded {
        println!("   {:<18} {} (superseded)", file.source.as_str(), file.name);
    }
    for name in &set.unrecognized {
        println!("   {:<18} {}", "?", name);
    }
    Ok(())
}

/// Route every raw file for `year` under `root`
pub fn list_files(root: &Path, year: i32) -> Result<RawFileSet> {
    let storage = LocalStorage::new(root);
    collect_raw_files(&storage, year)
        .with_context(|| format!("Failed to read {}", root.join(raw_dir(year)).display()))
}
