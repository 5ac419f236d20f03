use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::MeshreelResult;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Uniquely named temporary directory, deleted with its contents when dropped.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under `parent`.
    pub fn create_in(parent: &Path) -> MeshreelResult<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = parent.join(format!(
            "meshreel_{}_{}_{}",
            std::process::id(),
            nanos,
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create working directory '{}'", path.display()))?;
        tracing::debug!(workdir = %path.display(), "created working directory");
        Ok(Self { path })
    }

    /// Location of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the directory's contents into `dest` (created if needed) and keep them there.
    ///
    /// Entries are renamed where possible and copied otherwise, e.g. across filesystems. The
    /// emptied directory itself is still removed on drop.
    pub fn persist(self, dest: &Path) -> MeshreelResult<PathBuf> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create '{}'", dest.display()))?;
        let entries = std::fs::read_dir(&self.path)
            .with_context(|| format!("failed to list '{}'", self.path.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list '{}'", self.path.display()))?;
            let target = dest.join(entry.file_name());
            move_entry(&entry.path(), &target)?;
        }
        tracing::info!(dir = %dest.display(), "kept working files");
        Ok(dest.to_path_buf())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn move_entry(from: &Path, to: &Path) -> MeshreelResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_recursive(from, to)
        .with_context(|| format!("failed to move '{}' to '{}'", from.display(), to.display()))?;
    Ok(())
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(from, to).map(|_| ())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/workdir.rs"]
mod tests;
