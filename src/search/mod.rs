pub mod filters;

use anyhow::Result;
use rusqlite::types::ToSql;
use serde::Serialize;

use crate::db::models::UploadStatus;
use crate::db::Database;
use filters::UploadFilter;

/// A page row joined with its book, as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRow {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub page_number: Option<u32>,
    pub image: String,
    pub status: UploadStatus,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextHit {
    pub ocr_result_id: i64,
    pub upload_id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub page_number: Option<u32>,
    pub rank: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub total: usize,
    pub hits: Vec<TextHit>,
}

fn bind(filter_params: Vec<Box<dyn ToSql>>, lead: Option<String>, limit: usize) -> Vec<Box<dyn ToSql>> {
    let mut all_params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(lead) = lead {
        all_params.push(Box::new(lead));
    }
    all_params.extend(filter_params);
    all_params.push(Box::new(limit as i64));
    all_params
}

impl Database {
    /// Pages matching `filter`, grouped by book and ordered by page number.
    pub fn list_uploads(&self, filter: &UploadFilter, limit: usize) -> Result<Vec<UploadRow>> {
        let (conditions, filter_params) = filter.conditions(1);
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT u.id, u.book_id, b.title, u.page_number, u.image, u.status, l.code
             FROM uploads u
             JOIN books b ON b.id = u.book_id
             JOIN languages l ON l.id = u.language_id
             {where_clause}
             ORDER BY b.id, u.page_number, u.id
             LIMIT ?{}",
            filter_params.len() + 1
        );

        let all_params = bind(filter_params, None, limit);
        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(UploadRow {
                id: row.get(0)?,
                book_id: row.get(1)?,
                book_title: row.get(2)?,
                page_number: row.get(3)?,
                image: row.get(4)?,
                status: row.get(5)?,
                language: row.get(6)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Full-text search over recognized page text, best match first.
    pub fn search_text(&self, query: &str, filter: &UploadFilter, limit: usize) -> Result<Vec<TextHit>> {
        // ?1 is the MATCH expression
        let (conditions, filter_params) = filter.conditions(2);

        let mut where_parts = vec!["ocr_results_fts MATCH ?1".to_string()];
        where_parts.extend(conditions);
        let where_clause = where_parts.join(" AND ");

        let sql = format!(
            "SELECT o.id, u.id, b.id, b.title, u.page_number,
                    bm25(ocr_results_fts) AS rank,
                    snippet(ocr_results_fts, 0, '>>>', '<<<', '...', 24) AS snippet
             FROM ocr_results_fts
             JOIN ocr_results o ON o.id = ocr_results_fts.rowid
             JOIN uploads u ON u.id = o.upload_id
             JOIN books b ON b.id = u.book_id
             WHERE {where_clause}
             ORDER BY rank
             LIMIT ?{}",
            filter_params.len() + 2
        );

        let all_params = bind(filter_params, Some(query.to_string()), limit);
        let param_refs: Vec<&dyn ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(TextHit {
                ocr_result_id: row.get(0)?,
                upload_id: row.get(1)?,
                book_id: row.get(2)?,
                book_title: row.get(3)?,
                page_number: row.get(4)?,
                rank: row.get(5)?,
                snippet: row.get(6)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewUpload;
    use crate::db::tests::{seed_book, seed_language};

    fn seed(db: &Database) -> (i64, i64) {
        let lang = seed_language(db);
        let tales = seed_book(db, lang, "Old_Tales");
        let atlas = seed_book(db, lang, "Atlas");
        for (book, image, page) in [
            (tales, "uploaded_images/1_Old_Tales/t.page_2.png", 2),
            (tales, "uploaded_images/1_Old_Tales/t.page_1.png", 1),
            (atlas, "uploaded_images/2_Atlas/a.page_1.png", 1),
        ] {
            db.insert_upload(&NewUpload {
                image: image.into(),
                language_id: lang,
                book_id: book,
                page_number: Some(page),
            })
            .unwrap();
        }
        (tales, atlas)
    }

    fn add_text(db: &Database, upload_id: i64, text: &str) {
        db.insert_ocr_result(upload_id, text, "2024-01-01T00:00:00", "2024-01-01T00:01:00")
            .unwrap();
    }

    #[test]
    fn test_list_by_book_title() {
        let db = Database::open_in_memory().unwrap();
        let (tales, _) = seed(&db);

        let filter = UploadFilter {
            book_title: Some("old tales".into()),
            ..Default::default()
        };
        let rows = db.list_uploads(&filter, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.book_id == tales));
        assert_eq!(rows[0].page_number, Some(1));
        assert_eq!(rows[0].language, "en");
    }

    #[test]
    fn test_list_by_image_and_status() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.update_upload_status(3, UploadStatus::Segmented).unwrap();

        let filter = UploadFilter {
            image: Some("2_Atlas".into()),
            status: Some(UploadStatus::Segmented),
            ..Default::default()
        };
        let rows = db.list_uploads(&filter, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].book_title, "Atlas");

        let none = UploadFilter {
            status: Some(UploadStatus::Corrected),
            ..Default::default()
        };
        assert!(db.list_uploads(&none, 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_by_text() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        add_text(&db, 1, "a river ran through the valley");
        add_text(&db, 3, "mountains");

        let filter = UploadFilter {
            text: Some("river".into()),
            ..Default::default()
        };
        let rows = db.list_uploads(&filter, 10).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_search_text_ranks_and_filters() {
        let db = Database::open_in_memory().unwrap();
        let (tales, _) = seed(&db);
        add_text(&db, 1, "the river and the river bank");
        add_text(&db, 2, "a quiet village");
        add_text(&db, 3, "river delta maps");

        let hits = db.search_text("river", &UploadFilter::default(), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].snippet.contains(">>>river<<<"));

        let filter = UploadFilter {
            book_title: Some("Old".into()),
            ..Default::default()
        };
        let hits = db.search_text("river", &filter, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].book_id, tales);
        assert_eq!(hits[0].page_number, Some(2));
    }
}
