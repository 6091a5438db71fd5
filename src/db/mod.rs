pub mod migrations;
pub mod models;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use models::*;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Database {
    pub conn: Connection,
    pub path: PathBuf,
}

impl ToSql for UploadStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UploadStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;",
        )?;

        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;

        info!("Opened database: {}", path.display());

        Ok(Database {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open a private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;

        Ok(Database {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Default database path: ~/.digibook/digibook.db
    pub fn default_db_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".digibook").join("digibook.db"))
    }

    // ---- languages -------------------------------------------------------

    pub fn insert_language(&self, l: &NewLanguage) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO languages (code, name, postprocessing_enabled, dict_file, vocab_file)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![l.code, l.name, l.postprocessing_enabled, l.dict_file, l.vocab_file],
            )
            .with_context(|| format!("Failed to insert language: {}", l.code))?;
        let id = self.conn.last_insert_rowid();
        info!("Added language {} ({})", l.code, id);
        Ok(id)
    }

    pub fn get_language(&self, id: i64) -> Result<Option<Language>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, code, name, postprocessing_enabled, dict_file, vocab_file
                 FROM languages WHERE id = ?1",
                [id],
                language_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Look up a language by code, or by numeric id when `key` parses as one.
    pub fn find_language(&self, key: &str) -> Result<Option<Language>> {
        let by_code = self
            .conn
            .query_row(
                "SELECT id, code, name, postprocessing_enabled, dict_file, vocab_file
                 FROM languages WHERE code = ?1",
                [key],
                language_from_row,
            )
            .optional()?;
        if by_code.is_some() {
            return Ok(by_code);
        }
        match key.parse::<i64>() {
            Ok(id) => self.get_language(id),
            Err(_) => Ok(None),
        }
    }

    pub fn list_languages(&self) -> Result<Vec<Language>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, postprocessing_enabled, dict_file, vocab_file
             FROM languages ORDER BY code",
        )?;
        let rows = stmt.query_map([], language_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn add_language_editor(&self, language_id: i64, username: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO language_editors (language_id, username) VALUES (?1, ?2)",
            params![language_id, username],
        )?;
        Ok(())
    }

    pub fn get_language_editors(&self, language_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT username FROM language_editors WHERE language_id = ?1 ORDER BY username",
        )?;
        let rows = stmt.query_map([language_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- books -----------------------------------------------------------

    /// Insert a book with its tags in one transaction.
    pub fn insert_book(&self, b: &NewBook) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let id = insert_book(&tx, b)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                [id],
                book_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// First book (lowest id) with exactly this title.
    pub fn find_book_by_title(&self, title: &str) -> Result<Option<Book>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE title = ?1 ORDER BY id LIMIT 1"),
                [title],
                book_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Books, newest first.
    pub fn list_books(&self, limit: usize) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], book_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_book_tags(&self, book_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.tag FROM book_tags t
             JOIN book_tag_links l ON l.tag_id = t.id
             WHERE l.book_id = ?1 ORDER BY t.tag",
        )?;
        let rows = stmt.query_map([book_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn mark_book_completed(&self, book_id: i64, daisy_xml: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE books SET completed = 1, daisy_xml = ?2,
                 modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1",
            params![book_id, daisy_xml],
        )?;
        Ok(updated > 0)
    }

    /// Delete a book and all related rows (cascading).
    pub fn delete_book(&self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM books WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    pub fn count_books(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))?)
    }

    // ---- audio books -----------------------------------------------------

    pub fn insert_audio_book(&self, book_id: i64, username: Option<&str>, urls: &[String]) -> Result<i64> {
        let download_url = urls
            .iter()
            .map(|u| u.trim())
            .collect::<Vec<_>>()
            .join(",");
        self.conn.execute(
            "INSERT INTO audio_books (username, download_url, book_id) VALUES (?1, ?2, ?3)",
            params![username, download_url, book_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_audio_books(&self, book_id: i64) -> Result<Vec<AudioBook>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, download_url, book_id, created_at
             FROM audio_books WHERE book_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([book_id], |row| {
            Ok(AudioBook {
                id: row.get(0)?,
                username: row.get(1)?,
                download_url: row.get(2)?,
                book_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- uploads ---------------------------------------------------------

    pub fn insert_upload(&self, u: &NewUpload) -> Result<i64> {
        insert_upload(&self.conn, u)
    }

    pub fn get_upload(&self, id: i64) -> Result<Option<Upload>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?1"),
                [id],
                upload_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Pages of a book ordered by page number.
    pub fn get_uploads_for_book(&self, book_id: i64) -> Result<Vec<Upload>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE book_id = ?1 ORDER BY page_number, id"
        ))?;
        let rows = stmt.query_map([book_id], upload_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_uploads_for_title(&self, title: &str) -> Result<i64> {
        count_uploads_for_title(&self.conn, title)
    }

    pub fn count_uploads(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM uploads", [], |r| r.get(0))?)
    }

    /// Store a new status. `processed` is raised when the page enters `processed`.
    pub fn update_upload_status(&self, id: i64, status: UploadStatus) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE uploads SET status = ?2,
                 processed = CASE WHEN ?2 = 'processed' THEN 1 ELSE processed END,
                 modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1",
            params![id, status],
        )?;
        Ok(updated > 0)
    }

    pub fn set_upload_xmldata(&self, id: i64, xmldata: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE uploads SET xmldata = ?2, modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1",
            params![id, xmldata],
        )?;
        Ok(())
    }

    /// Percentage of a book's pages flagged as processed (0 for an empty book).
    pub fn book_progress(&self, book_id: i64) -> Result<u32> {
        let (processed, total): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(processed), 0), COUNT(*) FROM uploads WHERE book_id = ?1",
            [book_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        if total == 0 {
            return Ok(0);
        }
        Ok((processed * 100 / total) as u32)
    }

    // ---- segmentation ----------------------------------------------------

    pub fn insert_segmentation(
        &self,
        upload_id: i64,
        fixed_image: Option<&str>,
        plot_file: Option<&str>,
        plot_image: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO segmentation_results
                 (upload_id, fixed_image, segmentation_plot_file, segmentation_plot_image)
             VALUES (?1, ?2, ?3, ?4)",
            params![upload_id, fixed_image, plot_file, plot_image],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_segmentation(&self, id: i64) -> Result<Option<SegmentationResult>> {
        self.query_segmentation("id", id)
    }

    pub fn get_segmentation_for_upload(&self, upload_id: i64) -> Result<Option<SegmentationResult>> {
        self.query_segmentation("upload_id", upload_id)
    }

    fn query_segmentation(&self, column: &str, value: i64) -> Result<Option<SegmentationResult>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, upload_id, manually_fixed, fixed_image, segmentation_plot_file,
                            segmentation_plot_image, created_at, modified_at
                     FROM segmentation_results WHERE {column} = ?1"
                ),
                [value],
                |row| {
                    Ok(SegmentationResult {
                        id: row.get(0)?,
                        upload_id: row.get(1)?,
                        manually_fixed: row.get(2)?,
                        fixed_image: row.get(3)?,
                        segmentation_plot_file: row.get(4)?,
                        segmentation_plot_image: row.get(5)?,
                        created_at: row.get(6)?,
                        modified_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn set_manually_fixed(&self, segmentation_id: i64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE segmentation_results SET manually_fixed = 1,
                 modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1",
            [segmentation_id],
        )?;
        Ok(updated > 0)
    }

    // ---- OCR results -----------------------------------------------------

    pub fn insert_ocr_result(&self, upload_id: i64, result: &str, start_time: &str, finish_time: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ocr_results (upload_id, result, start_time, finish_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![upload_id, result, start_time, finish_time],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_ocr_result(&self, id: i64) -> Result<Option<OcrResult>> {
        self.query_ocr_result("id", id)
    }

    pub fn get_ocr_result_for_upload(&self, upload_id: i64) -> Result<Option<OcrResult>> {
        self.query_ocr_result("upload_id", upload_id)
    }

    fn query_ocr_result(&self, column: &str, value: i64) -> Result<Option<OcrResult>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, upload_id, result, start_time, finish_time, corrected, check_out,
                            check_out_by, check_out_time, created_at, modified_at
                     FROM ocr_results WHERE {column} = ?1"
                ),
                [value],
                |row| {
                    Ok(OcrResult {
                        id: row.get(0)?,
                        upload_id: row.get(1)?,
                        result: row.get(2)?,
                        start_time: row.get(3)?,
                        finish_time: row.get(4)?,
                        corrected: row.get(5)?,
                        check_out: row.get(6)?,
                        check_out_by: row.get(7)?,
                        check_out_time: row.get(8)?,
                        created_at: row.get(9)?,
                        modified_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Claim an OCR result for manual correction. Returns false when someone
    /// already holds it or it is already corrected; the test and the set are
    /// one statement.
    pub fn try_checkout(&self, ocr_result_id: i64, editor: &str, at: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE ocr_results SET check_out = 1, check_out_by = ?2, check_out_time = ?3,
                 modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = ?1 AND check_out = 0 AND corrected = 0",
            params![ocr_result_id, editor, at],
        )?;
        Ok(updated == 1)
    }

    /// Drop a claim held by `editor`. Returns false when `editor` is not the holder.
    pub fn release_checkout(&self, ocr_result_id: i64, editor: &str) -> Result<bool> {
        release_checkout(&self.conn, ocr_result_id, editor)
    }

    // ---- error words -----------------------------------------------------

    /// Insert an error word and its ordered suggestions (numbered from 1).
    pub fn insert_error_word(
        &self,
        ocr_result_id: i64,
        word: &str,
        corrected: &str,
        suggestion_number: Option<u32>,
        suggestions: &[String],
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO error_words (ocr_result_id, word, corrected, suggestion_number)
             VALUES (?1, ?2, ?3, ?4)",
            params![ocr_result_id, word, corrected, suggestion_number],
        )?;
        let error_word_id = tx.last_insert_rowid();

        for (i, s) in suggestions.iter().enumerate() {
            tx.execute(
                "INSERT INTO error_word_suggestions (error_word_id, suggestion, suggestion_number)
                 VALUES (?1, ?2, ?3)",
                params![error_word_id, s, (i + 1) as u32],
            )?;
        }

        tx.commit()?;
        Ok(error_word_id)
    }

    pub fn get_error_words(&self, ocr_result_id: i64) -> Result<Vec<ErrorWord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ocr_result_id, word, corrected, suggestion_number
             FROM error_words WHERE ocr_result_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([ocr_result_id], |row| {
            Ok(ErrorWord {
                id: row.get(0)?,
                ocr_result_id: row.get(1)?,
                word: row.get(2)?,
                corrected: row.get(3)?,
                suggestion_number: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_suggestions(&self, error_word_id: i64) -> Result<Vec<ErrorWordSuggestion>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, error_word_id, suggestion, suggestion_number
             FROM error_word_suggestions WHERE error_word_id = ?1 ORDER BY suggestion_number",
        )?;
        let rows = stmt.query_map([error_word_id], |row| {
            Ok(ErrorWordSuggestion {
                id: row.get(0)?,
                error_word_id: row.get(1)?,
                suggestion: row.get(2)?,
                suggestion_number: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- corrected results and accuracy ----------------------------------

    pub fn get_corrected_result(&self, id: i64) -> Result<Option<CorrectedResult>> {
        self.query_corrected_result("id", id)
    }

    pub fn get_corrected_for_ocr(&self, ocr_result_id: i64) -> Result<Option<CorrectedResult>> {
        self.query_corrected_result("ocr_result_id", ocr_result_id)
    }

    fn query_corrected_result(&self, column: &str, value: i64) -> Result<Option<CorrectedResult>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, ocr_result_id, result, editor, check_out_time, check_in_time,
                            created_at, modified_at
                     FROM corrected_results WHERE {column} = ?1"
                ),
                [value],
                |row| {
                    Ok(CorrectedResult {
                        id: row.get(0)?,
                        ocr_result_id: row.get(1)?,
                        result: row.get(2)?,
                        editor: row.get(3)?,
                        check_out_time: row.get(4)?,
                        check_in_time: row.get(5)?,
                        created_at: row.get(6)?,
                        modified_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn insert_accuracy(&self, corrected_result_id: i64, word_accuracy: Option<f64>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO accuracies (corrected_result_id, word_accuracy) VALUES (?1, ?2)",
            params![corrected_result_id, word_accuracy],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_accuracy_for_corrected(&self, corrected_result_id: i64) -> Result<Option<Accuracy>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, corrected_result_id, word_accuracy
                 FROM accuracies WHERE corrected_result_id = ?1",
                [corrected_result_id],
                |row| {
                    Ok(Accuracy {
                        id: row.get(0)?,
                        corrected_result_id: row.get(1)?,
                        word_accuracy: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Get database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };

        let languages = count("SELECT COUNT(*) FROM languages")?;
        let books = count("SELECT COUNT(*) FROM books")?;
        let completed_books = count("SELECT COUNT(*) FROM books WHERE completed = 1")?;
        let uploads = count("SELECT COUNT(*) FROM uploads")?;
        let ocr_results = count("SELECT COUNT(*) FROM ocr_results")?;
        let corrected_results = count("SELECT COUNT(*) FROM corrected_results")?;
        let audio_books = count("SELECT COUNT(*) FROM audio_books")?;

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM uploads GROUP BY status ORDER BY status")?;
        let status_rows = stmt.query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let statuses = status_rows.collect::<rusqlite::Result<Vec<_>>>()?;

        let db_size_bytes = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(DbStats {
            languages,
            books,
            completed_books,
            uploads,
            ocr_results,
            corrected_results,
            audio_books,
            statuses,
            db_size_bytes,
        })
    }

    /// Rebuild the OCR text index from scratch.
    pub fn reindex(&self) -> Result<()> {
        self.conn
            .execute_batch("INSERT INTO ocr_results_fts(ocr_results_fts) VALUES('rebuild');")?;
        info!("FTS5 index rebuilt");
        Ok(())
    }
}

// Connection-level helpers, usable inside a caller's transaction.

const BOOK_COLUMNS: &str = "id, code, title, author, zip_file, language_id, year, details,
    is_audio_required, completed, daisy_xml, created_at, modified_at";

const UPLOAD_COLUMNS: &str = "id, image, xmldata, language_id, book_id, page_number, status,
    processed, created_at, modified_at";

pub(crate) fn insert_book(conn: &Connection, b: &NewBook) -> Result<i64> {
    conn.execute(
        "INSERT INTO books (title, author, zip_file, language_id, year, details, is_audio_required)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            b.title,
            b.author,
            b.zip_file,
            b.language_id,
            b.year,
            b.details,
            b.is_audio_required,
        ],
    )
    .with_context(|| format!("Failed to insert book: {}", b.title))?;
    let book_id = conn.last_insert_rowid();

    for tag in &b.tags {
        let tag_id = get_or_create_tag(conn, tag)?;
        conn.execute(
            "INSERT OR IGNORE INTO book_tag_links (book_id, tag_id) VALUES (?1, ?2)",
            params![book_id, tag_id],
        )?;
    }

    Ok(book_id)
}

pub(crate) fn set_book_zip_file(conn: &Connection, book_id: i64, zip_file: &str) -> Result<()> {
    conn.execute(
        "UPDATE books SET zip_file = ?2 WHERE id = ?1",
        params![book_id, zip_file],
    )?;
    Ok(())
}

pub(crate) fn get_or_create_tag(conn: &Connection, tag: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO book_tags (tag) VALUES (?1)", [tag])?;
    Ok(conn.query_row("SELECT id FROM book_tags WHERE tag = ?1", [tag], |r| r.get(0))?)
}

pub(crate) fn insert_upload(conn: &Connection, u: &NewUpload) -> Result<i64> {
    conn.execute(
        "INSERT INTO uploads (image, language_id, book_id, page_number, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![u.image, u.language_id, u.book_id, u.page_number, UploadStatus::New],
    )
    .with_context(|| format!("Failed to insert upload: {}", u.image))?;
    Ok(conn.last_insert_rowid())
}

/// Pages attached to any book carrying `title`.
pub(crate) fn count_uploads_for_title(conn: &Connection, title: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM uploads u JOIN books b ON b.id = u.book_id WHERE b.title = ?1",
        [title],
        |r| r.get(0),
    )?)
}

pub(crate) fn release_checkout(conn: &Connection, ocr_result_id: i64, editor: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE ocr_results SET check_out = 0, check_out_by = NULL, check_out_time = NULL,
             modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1 AND check_out = 1 AND check_out_by = ?2",
        params![ocr_result_id, editor],
    )?;
    Ok(updated == 1)
}

fn language_from_row(row: &Row<'_>) -> rusqlite::Result<Language> {
    Ok(Language {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        postprocessing_enabled: row.get(3)?,
        dict_file: row.get(4)?,
        vocab_file: row.get(5)?,
    })
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        zip_file: row.get(4)?,
        language_id: row.get(5)?,
        year: row.get(6)?,
        details: row.get(7)?,
        is_audio_required: row.get(8)?,
        completed: row.get(9)?,
        daisy_xml: row.get(10)?,
        created_at: row.get(11)?,
        modified_at: row.get(12)?,
    })
}

pub(crate) fn upload_from_row(row: &Row<'_>) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        image: row.get(1)?,
        xmldata: row.get(2)?,
        language_id: row.get(3)?,
        book_id: row.get(4)?,
        page_number: row.get(5)?,
        status: row.get(6)?,
        processed: row.get(7)?,
        created_at: row.get(8)?,
        modified_at: row.get(9)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn seed_language(db: &Database) -> i64 {
        db.insert_language(&NewLanguage {
            code: "en".into(),
            name: "English".into(),
            postprocessing_enabled: false,
            dict_file: String::new(),
            vocab_file: String::new(),
        })
        .unwrap()
    }

    pub(crate) fn seed_book(db: &Database, language_id: i64, title: &str) -> i64 {
        db.insert_book(&NewBook {
            title: title.into(),
            language_id,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        let version: String = db
            .conn
            .query_row(
                "SELECT value FROM digibook_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_find_language_by_code_or_id() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_language(&db);
        assert_eq!(db.find_language("en").unwrap().unwrap().id, id);
        assert_eq!(db.find_language(&id.to_string()).unwrap().unwrap().code, "en");
        assert!(db.find_language("fr").unwrap().is_none());
    }

    #[test]
    fn test_book_tags_are_shared() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let a = db
            .insert_book(&NewBook {
                title: "A".into(),
                language_id: lang,
                tags: vec!["poetry".into(), "1900s".into()],
                ..Default::default()
            })
            .unwrap();
        let b = db
            .insert_book(&NewBook {
                title: "B".into(),
                language_id: lang,
                tags: vec!["poetry".into()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(db.get_book_tags(a).unwrap(), vec!["1900s", "poetry"]);
        assert_eq!(db.get_book_tags(b).unwrap(), vec!["poetry"]);
        let tag_rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM book_tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tag_rows, 2);
    }

    #[test]
    fn test_upload_status_round_trips_through_sql() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Demo");
        let id = db
            .insert_upload(&NewUpload {
                image: "uploaded_images/English/1/p.1.png".into(),
                language_id: lang,
                book_id: book,
                page_number: Some(1),
            })
            .unwrap();

        assert_eq!(db.get_upload(id).unwrap().unwrap().status, UploadStatus::New);
        db.update_upload_status(id, UploadStatus::Processed).unwrap();
        let upload = db.get_upload(id).unwrap().unwrap();
        assert_eq!(upload.status, UploadStatus::Processed);
        assert!(upload.processed);
        assert_eq!(db.book_progress(book).unwrap(), 100);
    }

    #[test]
    fn test_try_checkout_skips_corrected_results() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Done");
        let upload = db
            .insert_upload(&NewUpload {
                image: "d.page_1.png".into(),
                language_id: lang,
                book_id: book,
                page_number: Some(1),
            })
            .unwrap();
        let ocr = db
            .insert_ocr_result(upload, "text", "2024-01-01T00:00:00", "2024-01-01T00:00:01")
            .unwrap();
        db.conn
            .execute("UPDATE ocr_results SET corrected = 1 WHERE id = ?1", [ocr])
            .unwrap();

        assert!(!db.try_checkout(ocr, "asha", "2024-01-02T00:00:00").unwrap());
        let stored = db.get_ocr_result(ocr).unwrap().unwrap();
        assert!(!stored.check_out);
        assert!(stored.check_out_by.is_none());
    }

    #[test]
    fn test_delete_book_cascades() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Gone");
        db.insert_upload(&NewUpload {
            image: "x.1.png".into(),
            language_id: lang,
            book_id: book,
            page_number: Some(1),
        })
        .unwrap();

        assert!(db.delete_book(book).unwrap());
        assert_eq!(db.count_uploads().unwrap(), 0);
        assert!(!db.delete_book(book).unwrap());
    }

    #[test]
    fn test_audio_book_urls() {
        let db = Database::open_in_memory().unwrap();
        let lang = seed_language(&db);
        let book = seed_book(&db, lang, "Heard");
        db.insert_audio_book(book, Some("asha"), &["a.mp3".into(), " b.mp3".into()])
            .unwrap();

        let audio = db.get_audio_books(book).unwrap();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].download_url, "a.mp3,b.mp3");
        assert_eq!(audio[0].download_urls(), vec!["a.mp3", "b.mp3"]);
    }
}
