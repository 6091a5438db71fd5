use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{CatalogError, Result};

fn open_archive(zip_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(zip_path).map_err(|e| CatalogError::io(zip_path, e))?;
    ZipArchive::new(file).map_err(|source| CatalogError::Archive {
        path: zip_path.to_path_buf(),
        source,
    })
}

/// Unpack every entry of `zip_path` into `dest`. Returns the entry count.
pub fn extract(zip_path: &Path, dest: &Path) -> Result<usize> {
    let mut archive = open_archive(zip_path)?;
    archive.extract(dest).map_err(|source| CatalogError::Archive {
        path: zip_path.to_path_buf(),
        source,
    })?;
    debug!("Extracted {} entries to {}", archive.len(), dest.display());
    Ok(archive.len())
}

/// Names of the file entries of an archive, sorted.
pub fn list_entries(zip_path: &Path) -> Result<Vec<String>> {
    let archive = open_archive(zip_path)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

/// Every regular file below `dir`, in a stable order.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    debug!("Found {} files under {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(body).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_and_collect() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("book.zip");
        write_zip(
            &zip_path,
            &[
                ("vol/", b""),
                ("vol/b.page_2.png", b"2"),
                ("a.page_1.png", b"1"),
            ],
        );

        let dest = temp.path().join("out");
        assert_eq!(extract(&zip_path, &dest).unwrap(), 3);

        let files = collect_files(&dest).unwrap();
        assert_eq!(files, vec![dest.join("a.page_1.png"), dest.join("vol/b.page_2.png")]);
        assert_eq!(list_entries(&zip_path).unwrap(), vec!["a.page_1.png", "vol/b.page_2.png"]);
    }

    #[test]
    fn test_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("broken.zip");
        std::fs::write(&zip_path, b"definitely not a zip").unwrap();

        let err = extract(&zip_path, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, CatalogError::Archive { .. }));
    }
}
