use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::db::models::{Book, Language};
use crate::db::Database;
use crate::error::{CatalogError, Result, ValidationErrors};

const MAX_TITLE_LEN: usize = 255;
const MAX_AUTHOR_LEN: usize = 255;
const MAX_TAG_LEN: usize = 20;

fn year_pattern() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"^\d{4}$").expect("valid year regex"))
}

/// Submitted fields for a new book.
#[derive(Debug, Clone, Default)]
pub struct BookForm {
    pub zip_file: PathBuf,
    pub title: String,
    /// Language code or id.
    pub language: String,
    pub author: String,
    pub year: String,
    pub tags: Vec<String>,
    pub is_audio_required: bool,
}

/// Submitted fields for a page added to an existing book.
#[derive(Debug, Clone)]
pub struct PageForm {
    pub image: PathBuf,
    pub language: String,
    pub book: i64,
}

/// Submitted fields for a page attached to the single-page book.
#[derive(Debug, Clone)]
pub struct SinglePageForm {
    pub image: PathBuf,
    pub language: String,
}

/// The title names a directory under the media root, so it must stay one
/// path segment.
fn is_single_path_segment(title: &str) -> bool {
    !title.contains(&['/', '\\'][..]) && title != "." && title != ".."
}

fn check_file(errors: &mut ValidationErrors, field: &'static str, path: &Path) {
    if path.as_os_str().is_empty() {
        errors.add(field, "This field is required.");
    } else if !path.is_file() {
        errors.add(field, format!("No such file: {}", path.display()));
    }
}

fn check_language(errors: &mut ValidationErrors, db: &Database, key: &str) -> Result<Option<Language>> {
    if key.trim().is_empty() {
        errors.add("language", "This field is required.");
        return Ok(None);
    }
    let language = db.find_language(key.trim())?;
    if language.is_none() {
        errors.add("language", format!("Unknown language: {key}"));
    }
    Ok(language)
}

impl BookForm {
    /// Check every field without touching storage. Returns the resolved language.
    pub fn validate(&self, db: &Database) -> Result<Language> {
        let mut errors = ValidationErrors::default();

        check_file(&mut errors, "zip_file", &self.zip_file);

        let title = self.title.trim();
        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.add("title", format!("Ensure this value has at most {MAX_TITLE_LEN} characters."));
        } else if !is_single_path_segment(title) {
            errors.add("title", "Title cannot contain '/', '\\' or be '.' or '..'.");
        }

        if self.author.chars().count() > MAX_AUTHOR_LEN {
            errors.add("author", format!("Ensure this value has at most {MAX_AUTHOR_LEN} characters."));
        }

        if !self.year.is_empty() && !year_pattern().is_match(&self.year) {
            errors.add("year", "Enter 4 digit year.");
        }

        for tag in &self.tags {
            let tag = tag.trim();
            if tag.is_empty() {
                errors.add("tags", "Tags cannot be blank.");
            } else if tag.chars().count() > MAX_TAG_LEN {
                errors.add("tags", format!("Tag '{tag}' is longer than {MAX_TAG_LEN} characters."));
            }
        }

        let language = check_language(&mut errors, db, &self.language)?;
        errors.into_result()?;
        language.ok_or_else(|| CatalogError::not_found("Language", &self.language))
    }
}

impl PageForm {
    pub fn validate(&self, db: &Database) -> Result<(Language, Book)> {
        let mut errors = ValidationErrors::default();
        check_file(&mut errors, "image", &self.image);
        let language = check_language(&mut errors, db, &self.language)?;
        let book = db.get_book(self.book)?;
        if book.is_none() {
            errors.add("book", format!("Unknown book: {}", self.book));
        }
        errors.into_result()?;

        let language = language.ok_or_else(|| CatalogError::not_found("Language", &self.language))?;
        let book = book.ok_or_else(|| CatalogError::not_found("Book", self.book))?;
        Ok((language, book))
    }
}

impl SinglePageForm {
    pub fn validate(&self, db: &Database) -> Result<Language> {
        let mut errors = ValidationErrors::default();
        check_file(&mut errors, "image", &self.image);
        let language = check_language(&mut errors, db, &self.language)?;
        errors.into_result()?;
        language.ok_or_else(|| CatalogError::not_found("Language", &self.language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{seed_book, seed_language};
    use tempfile::TempDir;

    fn errors_of(result: Result<impl std::fmt::Debug>) -> ValidationErrors {
        match result {
            Err(CatalogError::Validation(e)) => e,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_book_form() {
        let temp = TempDir::new().unwrap();
        let zip = temp.path().join("b.zip");
        std::fs::write(&zip, b"zip").unwrap();
        let db = Database::open_in_memory().unwrap();
        seed_language(&db);

        let form = BookForm {
            zip_file: zip,
            title: "My Book".into(),
            language: "en".into(),
            year: "1921".into(),
            tags: vec!["novel".into()],
            ..Default::default()
        };
        assert_eq!(form.validate(&db).unwrap().code, "en");
    }

    #[test]
    fn test_book_form_collects_every_error() {
        let db = Database::open_in_memory().unwrap();
        let form = BookForm {
            zip_file: PathBuf::from("/nonexistent/b.zip"),
            title: "  ".into(),
            language: "xx".into(),
            year: "21".into(),
            tags: vec!["a-tag-that-is-far-too-long".into()],
            ..Default::default()
        };

        let errors = errors_of(form.validate(&db));
        for field in ["zip_file", "title", "language", "year", "tags"] {
            assert!(errors.has_field(field), "missing error for {field}");
        }
    }

    #[test]
    fn test_title_must_be_one_path_segment() {
        let temp = TempDir::new().unwrap();
        let zip = temp.path().join("b.zip");
        std::fs::write(&zip, b"zip").unwrap();
        let db = Database::open_in_memory().unwrap();
        seed_language(&db);

        for title in ["x/../../../escaped", "a\\b", "..", ".", "/abs"] {
            let form = BookForm {
                zip_file: zip.clone(),
                title: title.into(),
                language: "en".into(),
                ..Default::default()
            };
            assert!(errors_of(form.validate(&db)).has_field("title"), "accepted {title:?}");
        }

        let dotted = BookForm {
            zip_file: zip,
            title: "Vol. 2... and more".into(),
            language: "en".into(),
            ..Default::default()
        };
        assert!(dotted.validate(&db).is_ok());
    }

    #[test]
    fn test_page_form_unknown_book() {
        let temp = TempDir::new().unwrap();
        let image = temp.path().join("p.png");
        std::fs::write(&image, b"png").unwrap();
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Real");

        let ok = PageForm {
            image: image.clone(),
            language: "en".into(),
            book,
        };
        assert_eq!(ok.validate(&db).unwrap().1.id, book);

        let bad = PageForm {
            image,
            language: "en".into(),
            book: book + 100,
        };
        assert!(errors_of(bad.validate(&db)).has_field("book"));
    }
}
