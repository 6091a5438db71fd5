use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing stage of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    New,
    Segmented,
    Queued,
    Fixed,
    Processed,
    Corrected,
    Unusable,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 7] = [
        UploadStatus::New,
        UploadStatus::Segmented,
        UploadStatus::Queued,
        UploadStatus::Fixed,
        UploadStatus::Processed,
        UploadStatus::Corrected,
        UploadStatus::Unusable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::New => "new",
            UploadStatus::Segmented => "segmented",
            UploadStatus::Queued => "queued",
            UploadStatus::Fixed => "fixed",
            UploadStatus::Processed => "processed",
            UploadStatus::Corrected => "corrected",
            UploadStatus::Unusable => "unusable",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::New => "New",
            UploadStatus::Segmented => "Segmented",
            UploadStatus::Queued => "Queued for manual fix",
            UploadStatus::Fixed => "Manually fixed",
            UploadStatus::Processed => "Processed (OCR + PP)",
            UploadStatus::Corrected => "Corrected",
            UploadStatus::Unusable => "Unusable",
        }
    }

    /// Whether a page in this state may move to `next`.
    ///
    /// `unusable` is reachable from every other state and is terminal.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (Unusable, _) => false,
            (_, Unusable) => true,
            (New, Segmented)
            | (Segmented, Queued)
            | (Segmented, Processed)
            | (Queued, Fixed)
            | (Fixed, Processed)
            | (Processed, Corrected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown upload status: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub postprocessing_enabled: bool,
    pub dict_file: String,
    pub vocab_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTag {
    pub id: i64,
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub author: String,
    pub zip_file: String,
    pub language_id: i64,
    pub year: String,
    pub details: Option<String>,
    pub is_audio_required: bool,
    pub completed: bool,
    pub daisy_xml: String,
    pub created_at: String,
    pub modified_at: String,
}

impl Book {
    pub fn display_name(&self) -> String {
        crate::paths::display_title(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBook {
    pub id: i64,
    pub username: Option<String>,
    pub download_url: String,
    pub book_id: i64,
    pub created_at: String,
}

impl AudioBook {
    pub fn download_urls(&self) -> Vec<String> {
        self.download_url
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub image: String,
    pub xmldata: String,
    pub language_id: i64,
    pub book_id: i64,
    pub page_number: Option<u32>,
    pub status: UploadStatus,
    pub processed: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl Upload {
    /// Image base name after its first `_`.
    pub fn display_name(&self) -> String {
        let base = self.image.rsplit('/').next().unwrap_or(&self.image);
        match base.split_once('_') {
            Some((_, rest)) => rest.to_string(),
            None => base.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub id: i64,
    pub upload_id: i64,
    pub manually_fixed: bool,
    pub fixed_image: Option<String>,
    pub segmentation_plot_file: Option<String>,
    pub segmentation_plot_image: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub id: i64,
    pub upload_id: i64,
    pub result: String,
    pub start_time: String,
    pub finish_time: String,
    pub corrected: bool,
    pub check_out: bool,
    pub check_out_by: Option<String>,
    pub check_out_time: Option<String>,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWord {
    pub id: i64,
    pub ocr_result_id: i64,
    pub word: String,
    pub corrected: String,
    pub suggestion_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorWordSuggestion {
    pub id: i64,
    pub error_word_id: i64,
    pub suggestion: String,
    pub suggestion_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectedResult {
    pub id: i64,
    pub ocr_result_id: i64,
    pub result: String,
    pub editor: String,
    pub check_out_time: String,
    pub check_in_time: String,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accuracy {
    pub id: i64,
    pub corrected_result_id: i64,
    pub word_accuracy: Option<f64>,
}

/// Data needed to insert a new language.
#[derive(Debug, Clone)]
pub struct NewLanguage {
    pub code: String,
    pub name: String,
    pub postprocessing_enabled: bool,
    pub dict_file: String,
    pub vocab_file: String,
}

/// Data needed to insert a new book (no auto-generated fields).
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub zip_file: String,
    pub language_id: i64,
    pub year: String,
    pub details: Option<String>,
    pub tags: Vec<String>,
    pub is_audio_required: bool,
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub image: String,
    pub language_id: i64,
    pub book_id: i64,
    pub page_number: Option<u32>,
}

/// Stats returned by `digibook stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub languages: i64,
    pub books: i64,
    pub completed_books: i64,
    pub uploads: i64,
    pub ocr_results: i64,
    pub corrected_results: i64,
    pub audio_books: i64,
    pub statuses: Vec<StatusCount>,
    pub db_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
