pub mod archive;
pub mod form;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::MediaSettings;
use crate::db::models::{Book, Language, NewBook, NewUpload, Upload};
use crate::db::{self, Database};
use crate::error::{CatalogError, PageNumberParseError, Result};
use crate::paths::{self, page_number_from_filename, replace_space_with_underscore};
use crate::storage::MediaStore;

pub use form::BookForm;

/// Outcome of a successful import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub book: Book,
    pub uploads: Vec<Upload>,
    pub extract_dir: PathBuf,
}

/// One archive entry as it would be imported.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewEntry {
    pub name: String,
    pub page_number: Option<u32>,
    pub error: Option<String>,
}

/// Things written to disk during an import, removed again if it fails.
#[derive(Default)]
struct Written {
    zip_file: Option<String>,
    extract_dir: Option<PathBuf>,
}

/// Create a book from a zip of page scans.
///
/// The book row, its tags and one upload per extracted file are written in a
/// single transaction. Any failure rolls all of them back and removes the
/// stored archive and the extraction directory.
pub fn import_book(db: &Database, media: &MediaSettings, form: &BookForm, now: NaiveDateTime) -> Result<ImportReport> {
    let language = form.validate(db)?;
    let title = replace_space_with_underscore(form.title.trim());
    let store = MediaStore::new(&media.root);

    let tx = db.conn.unchecked_transaction()?;
    let mut written = Written::default();

    let outcome = write_book(&tx, media, &store, form, &language, &title, now, &mut written);
    let (book_id, extract_dir) = match outcome {
        Ok(done) => done,
        Err(e) => {
            drop(tx);
            discard(&store, written);
            warn!("Import of '{title}' failed, rolled back: {e}");
            return Err(e);
        }
    };
    tx.commit()?;

    let book = db
        .get_book(book_id)?
        .ok_or_else(|| CatalogError::not_found("Book", book_id))?;
    let uploads = db.get_uploads_for_book(book_id)?;
    info!("All {} images of '{}' have been saved", uploads.len(), book.title);

    Ok(ImportReport {
        book,
        uploads,
        extract_dir,
    })
}

#[allow(clippy::too_many_arguments)]
fn write_book(
    conn: &Connection,
    media: &MediaSettings,
    store: &MediaStore,
    form: &BookForm,
    language: &Language,
    title: &str,
    now: NaiveDateTime,
    written: &mut Written,
) -> Result<(i64, PathBuf)> {
    let book_id = db::insert_book(
        conn,
        &NewBook {
            title: title.to_string(),
            author: form.author.trim().to_string(),
            zip_file: String::new(),
            language_id: language.id,
            year: form.year.clone(),
            details: None,
            tags: form.tags.iter().map(|t| t.trim().to_string()).collect(),
            is_audio_required: form.is_audio_required,
        },
    )?;
    info!("Book '{title}' saved as {book_id}");

    let zip_name = form
        .zip_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("book.zip");
    let zip_rel = paths::zip_upload_path(language.id, title, &paths::timestamp(&now), zip_name);
    let stored_zip = store.store_copy(&form.zip_file, &zip_rel)?;
    written.zip_file = Some(stored_zip.clone());
    db::set_book_zip_file(conn, book_id, &stored_zip)?;

    let extract_dir = media
        .root
        .join(&media.images_uploaded)
        .join(format!("{book_id}_{title}"));
    if extract_dir.exists() {
        return Err(CatalogError::io(
            &extract_dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "extraction directory already exists"),
        ));
    }
    written.extract_dir = Some(extract_dir.clone());
    archive::extract(&store.absolute(&stored_zip), &extract_dir)?;
    info!("Files extracted to '{}'", extract_dir.display());

    for file in archive::collect_files(&extract_dir)? {
        let image = media.relative_path(&file);
        let page_number = page_number_from_filename(&image)?;
        db::insert_upload(
            conn,
            &NewUpload {
                image,
                language_id: language.id,
                book_id,
                page_number: Some(page_number),
            },
        )?;
    }

    Ok((book_id, extract_dir))
}

fn discard(store: &MediaStore, written: Written) {
    if let Some(dir) = written.extract_dir {
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove {}: {e}", dir.display());
            }
        }
    }
    if let Some(zip) = written.zip_file {
        store.discard(&zip);
    }
}

/// Validate the form and list what an import would create, without writing anything.
pub fn preview_book(db: &Database, form: &BookForm) -> Result<Vec<PreviewEntry>> {
    form.validate(db)?;
    let entries = archive::list_entries(&form.zip_file)?;
    Ok(entries
        .into_iter()
        .map(|name| {
            let parsed: std::result::Result<u32, PageNumberParseError> = page_number_from_filename(&name);
            PreviewEntry {
                page_number: parsed.as_ref().ok().copied(),
                error: parsed.err().map(|e| e.to_string()),
                name,
            }
        })
        .collect())
}

/// Where an import for `book_id`/`title` unpacks its pages.
pub fn extraction_dir(media: &MediaSettings, book_id: i64, title: &str) -> PathBuf {
    Path::new(&media.root)
        .join(&media.images_uploaded)
        .join(format!("{book_id}_{}", replace_space_with_underscore(title)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::seed_language;
    use crate::ingest::archive::tests::write_zip;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap()
    }

    fn setup() -> (TempDir, Database, MediaSettings) {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        seed_language(&db);
        let media = MediaSettings::new(temp.path().join("media"));
        (temp, db, media)
    }

    fn form(zip: &Path, title: &str) -> BookForm {
        BookForm {
            zip_file: zip.to_path_buf(),
            title: title.into(),
            language: "en".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_import_creates_book_and_pages() {
        let (temp, db, media) = setup();
        let zip = temp.path().join("scans.zip");
        write_zip(
            &zip,
            &[
                ("scan.page_03.png", b"3"),
                ("scan.page_01.png", b"1"),
                ("sub/scan.page_02.png", b"2"),
            ],
        );

        let report = import_book(&db, &media, &form(&zip, "Old Tales"), now()).unwrap();

        assert_eq!(report.book.title, "Old_Tales");
        assert_eq!(report.book.display_name(), "Old Tales");
        assert_eq!(
            report.book.zip_file,
            "compressed_input/1/2024-01-02_030405_Old_Tales/scans.zip"
        );
        assert!(media.root.join(&report.book.zip_file).is_file());
        assert_eq!(report.extract_dir, extraction_dir(&media, report.book.id, "Old Tales"));

        let pages: Vec<u32> = report.uploads.iter().filter_map(|u| u.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        let images: Vec<&str> = report.uploads.iter().map(|u| u.image.as_str()).collect();
        assert!(images.contains(&"uploaded_images/1_Old_Tales/sub/scan.page_02.png"));
        assert!(report
            .uploads
            .iter()
            .all(|u| u.status == crate::db::models::UploadStatus::New && u.book_id == report.book.id));
    }

    #[test]
    fn test_bad_filename_rolls_back_everything() {
        let (temp, db, media) = setup();
        let zip = temp.path().join("mixed.zip");
        write_zip(&zip, &[("a.page_1.png", b"1"), ("badname.png", b"x")]);

        let err = import_book(&db, &media, &form(&zip, "Mixed"), now()).unwrap_err();
        assert!(matches!(err, CatalogError::PageNumber(_)));

        assert_eq!(db.count_books().unwrap(), 0);
        assert_eq!(db.count_uploads().unwrap(), 0);
        assert!(!extraction_dir(&media, 1, "Mixed").exists());
        assert!(!media
            .root
            .join("compressed_input/1/2024-01-02_030405_Mixed/mixed.zip")
            .exists());
    }

    #[test]
    fn test_corrupt_archive_rolls_back() {
        let (temp, db, media) = setup();
        let zip = temp.path().join("broken.zip");
        std::fs::write(&zip, b"PK but not really").unwrap();

        let err = import_book(&db, &media, &form(&zip, "Broken"), now()).unwrap_err();
        assert!(matches!(err, CatalogError::Archive { .. }));
        assert_eq!(db.count_books().unwrap(), 0);
    }

    #[test]
    fn test_invalid_form_persists_nothing() {
        let (temp, db, media) = setup();
        let zip = temp.path().join("ok.zip");
        write_zip(&zip, &[("a.page_1.png", b"1")]);

        let mut bad = form(&zip, "Valid Title");
        bad.language = "zz".into();
        let err = import_book(&db, &media, &bad, now()).unwrap_err();

        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(db.count_books().unwrap(), 0);
        assert!(!media.root.exists());
    }

    #[test]
    fn test_title_cannot_leave_media_root() {
        let (temp, db, media) = setup();
        let zip = temp.path().join("ok.zip");
        write_zip(&zip, &[("a.page_1.png", b"1")]);

        let err = import_book(&db, &media, &form(&zip, "x/../../../escaped"), now()).unwrap_err();

        match err {
            CatalogError::Validation(errors) => assert!(errors.has_field("title")),
            other => panic!("expected validation errors, got {other:?}"),
        }
        assert_eq!(db.count_books().unwrap(), 0);
        assert!(!media.root.exists());
        assert!(!temp.path().join("escaped").exists());
    }

    #[test]
    fn test_preview_reports_parse_failures() {
        let (temp, db, _media) = setup();
        let zip = temp.path().join("p.zip");
        write_zip(&zip, &[("b.page_2.png", b"2"), ("badname.png", b"x")]);

        let entries = preview_book(&db, &form(&zip, "Preview")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "b.page_2.png");
        assert_eq!(entries[0].page_number, Some(2));
        assert!(entries[1].page_number.is_none());
        assert!(entries[1].error.is_some());
        assert_eq!(db.count_books().unwrap(), 0);
    }
}
