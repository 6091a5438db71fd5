//! Copying uploaded files into the media root.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Copy `src` to `relative` under the root. When that name is taken the
    /// file gets a `_2`, `_3`, ... suffix; the stored relative path is returned.
    pub fn store_copy(&self, src: &Path, relative: &str) -> Result<String> {
        let target = self.absolute(relative);
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }

        let final_path = resolve_conflict(&target)?;
        std::fs::copy(src, &final_path).map_err(|e| CatalogError::io(&final_path, e))?;

        let stored = match final_path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => relative.to_string(),
        };
        debug!("Stored {} as {stored}", src.display());
        Ok(stored)
    }

    /// Remove a stored file and its parent directory if that is left empty.
    /// Failures are logged, not returned.
    pub fn discard(&self, relative: &str) {
        let path = self.absolute(relative);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove {}: {e}", path.display());
            return;
        }
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
    }
}

pub(crate) fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| CatalogError::io(path, e))?;
    }
    Ok(())
}

/// First free variant of `path`: the path itself, then `name_2.ext` up to `name_1000.ext`.
fn resolve_conflict(path: &Path) -> Result<PathBuf> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(path.to_path_buf());
    }

    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());

    for counter in 2..=1000 {
        let candidate = match ext {
            Some(ext) => directory.join(format!("{stem}_{counter}.{ext}")),
            None => directory.join(format!("{stem}_{counter}")),
        };
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }

    Err(CatalogError::io(
        path,
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free file name"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_copy_creates_directories() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("page.png");
        std::fs::write(&src, b"png").unwrap();

        let store = MediaStore::new(temp.path().join("media"));
        let stored = store
            .store_copy(&src, "uploaded_images/English/3/page.png")
            .unwrap();

        assert_eq!(stored, "uploaded_images/English/3/page.png");
        assert_eq!(std::fs::read(store.absolute(&stored)).unwrap(), b"png");
        assert!(src.exists());
    }

    #[test]
    fn test_store_copy_conflict_numbering() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("page.png");
        std::fs::write(&src, b"png").unwrap();
        let store = MediaStore::new(temp.path());

        let first = store.store_copy(&src, "out/page.png").unwrap();
        let second = store.store_copy(&src, "out/page.png").unwrap();
        let third = store.store_copy(&src, "out/page.png").unwrap();

        assert_eq!(first, "out/page.png");
        assert_eq!(second, "out/page_2.png");
        assert_eq!(third, "out/page_3.png");
    }

    #[test]
    fn test_discard_removes_empty_parent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.zip");
        std::fs::write(&src, b"zip").unwrap();
        let store = MediaStore::new(temp.path().join("media"));

        let stored = store.store_copy(&src, "compressed_input/1/x/a.zip").unwrap();
        store.discard(&stored);

        assert!(!store.absolute(&stored).exists());
        assert!(!temp.path().join("media/compressed_input/1/x").exists());
    }
}
