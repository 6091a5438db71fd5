use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::db::models::UploadStatus;

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All field errors of a rejected form, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot derive a page number from '{filename}': {reason}")]
pub struct PageNumberParseError {
    pub filename: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid form data: {0}")]
    Validation(ValidationErrors),

    #[error("Failed to read archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error(transparent)]
    PageNumber(#[from] PageNumberParseError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} {id} is checked out by '{holder}'")]
    Concurrency {
        entity: &'static str,
        id: i64,
        holder: String,
    },

    #[error("{entity} {id} already exists for this record")]
    AlreadyExists { entity: &'static str, id: i64 },

    #[error("Upload {upload_id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        upload_id: i64,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error("Filesystem error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Database(e.into())
    }
}

impl CatalogError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        CatalogError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::default().into_result().is_ok());

        let mut errors = ValidationErrors::default();
        errors.add("title", "This field is required.");
        errors.add("year", "Enter 4 digit year.");
        match errors.into_result() {
            Err(CatalogError::Validation(e)) => {
                assert!(e.has_field("title"));
                assert_eq!(e.to_string(), "title: This field is required.; year: Enter 4 digit year.");
            }
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
