//! Adding pages one at a time, outside a zip import.

use rusqlite::{Transaction, TransactionBehavior};
use tracing::info;

use crate::config::MediaSettings;
use crate::db::models::{NewUpload, Upload};
use crate::db::{self, Database};
use crate::error::{CatalogError, Result};
use crate::ingest::form::{PageForm, SinglePageForm};
use crate::paths::{image_upload_path, random_alphanumeric};
use crate::storage::MediaStore;

/// Title of the book that single pages are attached to.
pub const SINGLE_PAGE_BOOK_TITLE: &str = "Demo";

/// Id of the single-page book, if one exists.
pub fn resolve_single_page_book_id(db: &Database) -> Result<Option<i64>> {
    Ok(db.find_book_by_title(SINGLE_PAGE_BOOK_TITLE)?.map(|b| b.id))
}

/// Page number the next page of a book with this title would get.
pub fn next_page_number(db: &Database, title: &str) -> Result<u32> {
    Ok(db.count_uploads_for_title(title)? as u32 + 1)
}

/// Add a page to an existing book, numbered after every page already filed
/// under the book's title.
///
/// Counting and inserting share one immediate transaction, so concurrent
/// callers on the same database file never receive the same number.
pub fn add_page(db: &Database, media: &MediaSettings, form: &PageForm) -> Result<Upload> {
    let (language, book) = form.validate(db)?;
    let store = MediaStore::new(&media.root);

    let tx = Transaction::new_unchecked(&db.conn, TransactionBehavior::Immediate)?;
    let page_number = db::count_uploads_for_title(&tx, &book.title)? as u32 + 1;

    let image = store_image(&store, &form.image, &language.name, book.id)?;
    let inserted = db::insert_upload(
        &tx,
        &NewUpload {
            image: image.clone(),
            language_id: language.id,
            book_id: book.id,
            page_number: Some(page_number),
        },
    );
    let upload_id = match inserted.and_then(|id| tx.commit().map(|_| id).map_err(Into::into)) {
        Ok(id) => id,
        Err(e) => {
            store.discard(&image);
            return Err(e.into());
        }
    };

    info!("Added page {page_number} to '{}' ({})", book.title, upload_id);
    fetch_upload(db, upload_id)
}

/// Add a lone page, numbered 1, to the single-page book.
pub fn add_single_page(db: &Database, media: &MediaSettings, form: &SinglePageForm) -> Result<Upload> {
    let language = form.validate(db)?;
    let book_id = resolve_single_page_book_id(db)?
        .ok_or_else(|| CatalogError::not_found("Book", SINGLE_PAGE_BOOK_TITLE))?;
    let store = MediaStore::new(&media.root);

    let image = store_image(&store, &form.image, &language.name, book_id)?;
    let inserted = db.insert_upload(&NewUpload {
        image: image.clone(),
        language_id: language.id,
        book_id,
        page_number: Some(1),
    });
    let upload_id = match inserted {
        Ok(id) => id,
        Err(e) => {
            store.discard(&image);
            return Err(e.into());
        }
    };

    info!("Added single page {upload_id} to book {book_id}");
    fetch_upload(db, upload_id)
}

fn store_image(store: &MediaStore, src: &std::path::Path, language_name: &str, book_id: i64) -> Result<String> {
    let filename = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CatalogError::io(src, std::io::Error::other("image path has no file name")))?;
    let relative = image_upload_path(language_name, Some(book_id), filename, || {
        random_alphanumeric(&mut rand::thread_rng())
    });
    store.store_copy(src, &relative)
}

fn fetch_upload(db: &Database, id: i64) -> Result<Upload> {
    db.get_upload(id)?
        .ok_or_else(|| CatalogError::not_found("Upload", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{seed_book, seed_language};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"png").unwrap();
        path
    }

    #[test]
    fn test_resolve_single_page_book_id() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        seed_book(&db, lang, "Not Demo");
        assert_eq!(resolve_single_page_book_id(&db).unwrap(), None);

        let demo = seed_book(&db, lang, "Demo");
        assert_eq!(resolve_single_page_book_id(&db).unwrap(), Some(demo));
    }

    #[test]
    fn test_add_page_numbers_sequentially() {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Atlas");
        let media = MediaSettings::new(temp.path().join("media"));
        let src = image(temp.path(), "leaf.png");

        let form = PageForm {
            image: src,
            language: "en".into(),
            book,
        };
        let first = add_page(&db, &media, &form).unwrap();
        let second = add_page(&db, &media, &form).unwrap();

        assert_eq!(first.page_number, Some(1));
        assert_eq!(second.page_number, Some(2));
        assert_eq!(first.image, format!("uploaded_images/English/{book}/leaf.png"));
        assert_eq!(second.image, format!("uploaded_images/English/{book}/leaf_2.png"));
        assert!(media.root.join(&second.image).is_file());
        assert_eq!(next_page_number(&db, "Atlas").unwrap(), 3);
    }

    #[test]
    fn test_page_count_is_per_title() {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let a = seed_book(&db, lang, "Same");
        let b = seed_book(&db, lang, "Same");
        let media = MediaSettings::new(temp.path());
        let src = image(temp.path(), "p.png");

        add_page(&db, &media, &PageForm { image: src.clone(), language: "en".into(), book: a }).unwrap();
        let upload = add_page(&db, &media, &PageForm { image: src, language: "en".into(), book: b }).unwrap();
        assert_eq!(upload.page_number, Some(2));
    }

    #[test]
    fn test_add_single_page() {
        let temp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let media = MediaSettings::new(temp.path().join("media"));
        let form = SinglePageForm {
            image: image(temp.path(), "one.png"),
            language: "en".into(),
        };

        let err = add_single_page(&db, &media, &form).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "Book", .. }));
        assert_eq!(db.count_uploads().unwrap(), 0);

        let demo = seed_book(&db, lang, "Demo");
        let upload = add_single_page(&db, &media, &form).unwrap();
        assert_eq!(upload.book_id, demo);
        assert_eq!(upload.page_number, Some(1));
    }
}
