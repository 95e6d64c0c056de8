//! Recycle bin for Unix desktops: the freedesktop.org trash directory.
//!
//! Recoverable items live under `<trash>/files`, their metadata under
//! `<trash>/info`. Clearing empties both (and `expunged`) but keeps the
//! directories themselves.

use crate::traits::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct FreedesktopTrash {
    root: PathBuf,
}

impl FreedesktopTrash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$XDG_DATA_HOME/Trash`, falling back to `~/.local/share/Trash`.
    pub fn default_location() -> Option<PathBuf> {
        if let Some(data) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(data).join("Trash"));
        }
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/Trash"))
    }
}

fn dir_size(dir: &Path) -> CapResult<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0u64;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| CapError::Io(e.into()))?;
        if entry.file_type().is_file() {
            let meta = entry.metadata().map_err(|e| CapError::Io(e.into()))?;
            total = total.saturating_add(meta.len());
        }
    }
    Ok(total)
}

fn empty_dir(dir: &Path) -> CapResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn map_permission(e: CapError, root: &Path) -> CapError {
    match e {
        CapError::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            CapError::PermissionDenied(format!("{}: {}", root.display(), io))
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl RecycleBinOps for FreedesktopTrash {
    async fn size(&self) -> CapResult<u64> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            dir_size(&root.join("files")).map_err(|e| map_permission(e, &root))
        })
        .await
        .map_err(|e| CapError::Other(format!("trash scan task failed: {}", e)))?
    }

    async fn clear(&self) -> CapResult<()> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> CapResult<()> {
            for sub in ["files", "info", "expunged"] {
                empty_dir(&root.join(sub)).map_err(|e| map_permission(e, &root))?;
            }
            let cache = root.join("directorysizes");
            if cache.exists() {
                std::fs::remove_file(&cache)?;
            }
            tracing::info!(trash = %root.display(), "trash emptied");
            Ok(())
        })
        .await
        .map_err(|e| CapError::Other(format!("trash clear task failed: {}", e)))?
    }
}
