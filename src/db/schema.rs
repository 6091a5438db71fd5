use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: &str = "1";

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Version tracking
        CREATE TABLE IF NOT EXISTS digibook_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Catalogue
        CREATE TABLE IF NOT EXISTS languages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT 'English',
            postprocessing_enabled INTEGER NOT NULL DEFAULT 0,
            dict_file TEXT NOT NULL DEFAULT '',
            vocab_file TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS language_editors (
            language_id INTEGER NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
            username TEXT NOT NULL,
            PRIMARY KEY (language_id, username)
        );

        CREATE TABLE IF NOT EXISTS book_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            zip_file TEXT NOT NULL DEFAULT '',
            language_id INTEGER NOT NULL REFERENCES languages(id),
            year TEXT NOT NULL DEFAULT '',
            details TEXT,
            is_audio_required INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0,
            daisy_xml TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS book_tag_links (
            book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES book_tags(id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS audio_books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT,
            download_url TEXT NOT NULL DEFAULT '',
            book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- Pages and their processing chain
        CREATE TABLE IF NOT EXISTS uploads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image TEXT NOT NULL,
            xmldata TEXT NOT NULL DEFAULT '',
            language_id INTEGER NOT NULL REFERENCES languages(id),
            book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            page_number INTEGER,
            status TEXT NOT NULL DEFAULT 'new'
                CHECK (status IN ('new', 'segmented', 'queued', 'fixed', 'processed', 'corrected', 'unusable')),
            processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS segmentation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            upload_id INTEGER NOT NULL UNIQUE REFERENCES uploads(id) ON DELETE CASCADE,
            manually_fixed INTEGER NOT NULL DEFAULT 0,
            fixed_image TEXT,
            segmentation_plot_file TEXT,
            segmentation_plot_image TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS ocr_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            upload_id INTEGER NOT NULL UNIQUE REFERENCES uploads(id) ON DELETE CASCADE,
            result TEXT NOT NULL DEFAULT '',
            start_time TEXT NOT NULL,
            finish_time TEXT NOT NULL,
            corrected INTEGER NOT NULL DEFAULT 0,
            check_out INTEGER NOT NULL DEFAULT 0,
            check_out_by TEXT,
            check_out_time TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS error_words (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ocr_result_id INTEGER NOT NULL REFERENCES ocr_results(id) ON DELETE CASCADE,
            word TEXT NOT NULL,
            corrected TEXT NOT NULL DEFAULT '',
            suggestion_number INTEGER
        );

        CREATE TABLE IF NOT EXISTS error_word_suggestions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            error_word_id INTEGER NOT NULL REFERENCES error_words(id) ON DELETE CASCADE,
            suggestion TEXT NOT NULL,
            suggestion_number INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS corrected_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ocr_result_id INTEGER NOT NULL UNIQUE REFERENCES ocr_results(id) ON DELETE CASCADE,
            result TEXT NOT NULL DEFAULT '',
            editor TEXT NOT NULL,
            check_out_time TEXT NOT NULL,
            check_in_time TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS accuracies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            corrected_result_id INTEGER NOT NULL UNIQUE REFERENCES corrected_results(id) ON DELETE CASCADE,
            word_accuracy REAL
        );

        -- Indexes for common filters
        CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
        CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
        CREATE INDEX IF NOT EXISTS idx_uploads_book ON uploads(book_id);
        CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status);
        CREATE INDEX IF NOT EXISTS idx_error_words_ocr ON error_words(ocr_result_id);

        -- FTS5 over recognized text (content-sync mode)
        CREATE VIRTUAL TABLE IF NOT EXISTS ocr_results_fts USING fts5(
            result,
            content='ocr_results',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS ocr_results_ai AFTER INSERT ON ocr_results BEGIN
            INSERT INTO ocr_results_fts(rowid, result) VALUES (new.id, new.result);
        END;

        CREATE TRIGGER IF NOT EXISTS ocr_results_ad AFTER DELETE ON ocr_results BEGIN
            INSERT INTO ocr_results_fts(ocr_results_fts, rowid, result)
            VALUES ('delete', old.id, old.result);
        END;

        CREATE TRIGGER IF NOT EXISTS ocr_results_au AFTER UPDATE OF result ON ocr_results BEGIN
            INSERT INTO ocr_results_fts(ocr_results_fts, rowid, result)
            VALUES ('delete', old.id, old.result);
            INSERT INTO ocr_results_fts(rowid, result) VALUES (new.id, new.result);
        END;
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO digibook_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
