use rusqlite::types::ToSql;

use crate::db::models::UploadStatus;

/// Filters that can be applied to page list and search queries.
#[derive(Debug, Clone, Default)]
pub struct UploadFilter {
    /// Substring of the owning book's title (spaces match underscores).
    pub book_title: Option<String>,
    /// Substring of the recognized or corrected text.
    pub text: Option<String>,
    /// Substring of the stored image path.
    pub image: Option<String>,
    pub status: Option<UploadStatus>,
    /// Language code.
    pub language: Option<String>,
}

impl UploadFilter {
    pub fn is_empty(&self) -> bool {
        self.book_title.is_none()
            && self.text.is_none()
            && self.image.is_none()
            && self.status.is_none()
            && self.language.is_none()
    }

    /// Build WHERE clause fragments over `u` (uploads) and `b` (books).
    /// Placeholders are numbered from `first_param`, so callers can put their
    /// own parameters in front.
    pub fn conditions(&self, first_param: usize) -> (Vec<String>, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let next = |params: &Vec<Box<dyn ToSql>>| first_param + params.len();

        if let Some(ref title) = self.book_title {
            conditions.push(format!("b.title LIKE ?{}", next(&params)));
            params.push(Box::new(format!(
                "%{}%",
                crate::paths::replace_space_with_underscore(title)
            )));
        }

        if let Some(ref text) = self.text {
            let n = next(&params);
            conditions.push(format!(
                "u.id IN (SELECT o.upload_id FROM ocr_results o
                          LEFT JOIN corrected_results c ON c.ocr_result_id = o.id
                          WHERE o.result LIKE ?{n} OR c.result LIKE ?{n})"
            ));
            params.push(Box::new(format!("%{text}%")));
        }

        if let Some(ref image) = self.image {
            conditions.push(format!("u.image LIKE ?{}", next(&params)));
            params.push(Box::new(format!("%{image}%")));
        }

        if let Some(status) = self.status {
            conditions.push(format!("u.status = ?{}", next(&params)));
            params.push(Box::new(status));
        }

        if let Some(ref language) = self.language {
            conditions.push(format!(
                "u.language_id IN (SELECT id FROM languages WHERE code = ?{})",
                next(&params)
            ));
            params.push(Box::new(language.clone()));
        }

        (conditions, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let filter = UploadFilter::default();
        assert!(filter.is_empty());
        let (conditions, params) = filter.conditions(1);
        assert!(conditions.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_placeholders_start_at_offset() {
        let filter = UploadFilter {
            book_title: Some("Old Tales".into()),
            status: Some(UploadStatus::New),
            ..Default::default()
        };
        let (conditions, params) = filter.conditions(2);
        assert_eq!(conditions, vec!["b.title LIKE ?2", "u.status = ?3"]);
        assert_eq!(params.len(), 2);
    }
}
