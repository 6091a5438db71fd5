//! Downstream records of a page: segmentation, OCR, error words, manual
//! correction and accuracy.
//!
//! Each record hangs off its predecessor (upload → segmentation → OCR →
//! correction → accuracy) and exists at most once per predecessor.

use chrono::NaiveDateTime;
use tracing::info;

use crate::db::models::{
    CorrectedResult, OcrResult, SegmentationResult, Upload, UploadStatus,
};
use crate::db::{self, Database};
use crate::error::{CatalogError, Result, ValidationErrors};
use crate::paths;

fn format_time(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn require_upload(db: &Database, upload_id: i64) -> Result<Upload> {
    db.get_upload(upload_id)?
        .ok_or_else(|| CatalogError::not_found("Upload", upload_id))
}

fn require_ocr(db: &Database, ocr_result_id: i64) -> Result<OcrResult> {
    db.get_ocr_result(ocr_result_id)?
        .ok_or_else(|| CatalogError::not_found("OCR result", ocr_result_id))
}

/// Move a page to `next`, rejecting moves the pipeline does not allow.
pub fn set_upload_status(db: &Database, upload_id: i64, next: UploadStatus) -> Result<Upload> {
    let upload = require_upload(db, upload_id)?;
    if !upload.status.can_transition_to(next) {
        return Err(CatalogError::InvalidTransition {
            upload_id,
            from: upload.status,
            to: next,
        });
    }
    db.update_upload_status(upload_id, next)?;
    info!("Upload {upload_id}: {} -> {next}", upload.status);
    require_upload(db, upload_id)
}

/// Names of the files a segmentation run produced. Only their extensions
/// are kept; the stored names derive from the page image.
#[derive(Debug, Clone, Default)]
pub struct SegmentationArtifacts {
    pub fixed_image: Option<String>,
    pub plot_file: Option<String>,
    pub plot_image: Option<String>,
}

pub fn record_segmentation(db: &Database, upload_id: i64, artifacts: &SegmentationArtifacts) -> Result<SegmentationResult> {
    let upload = require_upload(db, upload_id)?;
    if let Some(existing) = db.get_segmentation_for_upload(upload_id)? {
        return Err(CatalogError::AlreadyExists {
            entity: "Segmentation result",
            id: existing.id,
        });
    }

    let fixed = artifacts
        .fixed_image
        .as_deref()
        .map(|f| paths::fixed_image_path(&upload.image, f));
    let plot_file = artifacts
        .plot_file
        .as_deref()
        .map(|f| paths::segmentation_plot_file_path(&upload.image, f));
    let plot_image = artifacts
        .plot_image
        .as_deref()
        .map(|f| paths::segmentation_plot_image_path(&upload.image, f));

    let tx = db.conn.unchecked_transaction()?;
    if upload.status != UploadStatus::Segmented {
        set_upload_status(db, upload_id, UploadStatus::Segmented)?;
    }
    let id = db.insert_segmentation(upload_id, fixed.as_deref(), plot_file.as_deref(), plot_image.as_deref())?;
    tx.commit()?;
    info!("Recorded segmentation {id} for upload {upload_id}");

    db.get_segmentation(id)?
        .ok_or_else(|| CatalogError::not_found("Segmentation result", id))
}

/// Flag a segmentation as repaired by hand and move its page to `fixed`.
pub fn mark_manually_fixed(db: &Database, segmentation_id: i64) -> Result<SegmentationResult> {
    let seg = db
        .get_segmentation(segmentation_id)?
        .ok_or_else(|| CatalogError::not_found("Segmentation result", segmentation_id))?;
    let upload = require_upload(db, seg.upload_id)?;
    let tx = db.conn.unchecked_transaction()?;
    if upload.status == UploadStatus::Segmented {
        set_upload_status(db, upload.id, UploadStatus::Queued)?;
    }
    set_upload_status(db, upload.id, UploadStatus::Fixed)?;
    db.set_manually_fixed(segmentation_id)?;
    tx.commit()?;

    db.get_segmentation(segmentation_id)?
        .ok_or_else(|| CatalogError::not_found("Segmentation result", segmentation_id))
}

/// Store recognized text for a segmented page and mark it processed.
pub fn record_ocr(
    db: &Database,
    upload_id: i64,
    text: &str,
    xmldata: Option<&str>,
    start: NaiveDateTime,
    finish: NaiveDateTime,
) -> Result<OcrResult> {
    let upload = require_upload(db, upload_id)?;
    if db.get_segmentation_for_upload(upload_id)?.is_none() {
        return Err(CatalogError::not_found("Segmentation result for upload", upload_id));
    }
    if let Some(existing) = db.get_ocr_result_for_upload(upload_id)? {
        return Err(CatalogError::AlreadyExists {
            entity: "OCR result",
            id: existing.id,
        });
    }

    let tx = db.conn.unchecked_transaction()?;
    set_upload_status(db, upload.id, UploadStatus::Processed)?;
    let id = db.insert_ocr_result(upload_id, text, &format_time(&start), &format_time(&finish))?;
    if let Some(xml) = xmldata {
        db.set_upload_xmldata(upload_id, xml)?;
    }
    tx.commit()?;
    info!("Recorded OCR result {id} for upload {upload_id}");
    require_ocr(db, id)
}

/// Record a low-confidence word and its candidate corrections, in order.
pub fn add_error_word(
    db: &Database,
    ocr_result_id: i64,
    word: &str,
    corrected: &str,
    suggestions: &[String],
) -> Result<i64> {
    require_ocr(db, ocr_result_id)?;
    let chosen = suggestions
        .iter()
        .position(|s| s == corrected)
        .map(|i| (i + 1) as u32);
    Ok(db.insert_error_word(ocr_result_id, word, corrected, chosen, suggestions)?)
}

/// Claim an OCR result for manual correction.
pub fn checkout(db: &Database, ocr_result_id: i64, editor: &str, now: NaiveDateTime) -> Result<OcrResult> {
    let ocr = require_ocr(db, ocr_result_id)?;
    if ocr.corrected {
        return Err(CatalogError::AlreadyExists {
            entity: "Corrected result for OCR result",
            id: ocr_result_id,
        });
    }
    if !db.try_checkout(ocr_result_id, editor, &format_time(&now))? {
        let current = require_ocr(db, ocr_result_id)?;
        if current.corrected {
            return Err(CatalogError::AlreadyExists {
                entity: "Corrected result for OCR result",
                id: ocr_result_id,
            });
        }
        return Err(CatalogError::Concurrency {
            entity: "OCR result",
            id: ocr_result_id,
            holder: current.check_out_by.unwrap_or_default(),
        });
    }
    info!("OCR result {ocr_result_id} checked out by {editor}");
    require_ocr(db, ocr_result_id)
}

fn holder_conflict(db: &Database, ocr_result_id: i64) -> Result<CatalogError> {
    let ocr = require_ocr(db, ocr_result_id)?;
    Ok(CatalogError::Concurrency {
        entity: "OCR result",
        id: ocr_result_id,
        holder: ocr.check_out_by.unwrap_or_default(),
    })
}

/// Give up a claim. Only the editor holding it may release it.
pub fn release(db: &Database, ocr_result_id: i64, editor: &str) -> Result<()> {
    require_ocr(db, ocr_result_id)?;
    if !db.release_checkout(ocr_result_id, editor)? {
        return Err(holder_conflict(db, ocr_result_id)?);
    }
    info!("OCR result {ocr_result_id} released by {editor}");
    Ok(())
}

/// Check in the finished text of a claimed OCR result.
pub fn submit_correction(
    db: &Database,
    ocr_result_id: i64,
    editor: &str,
    text: &str,
    now: NaiveDateTime,
) -> Result<CorrectedResult> {
    let ocr = require_ocr(db, ocr_result_id)?;
    let upload = require_upload(db, ocr.upload_id)?;
    if !upload.status.can_transition_to(UploadStatus::Corrected) {
        return Err(CatalogError::InvalidTransition {
            upload_id: upload.id,
            from: upload.status,
            to: UploadStatus::Corrected,
        });
    }

    let check_out_time = ocr.check_out_time.clone().unwrap_or_else(|| format_time(&now));
    let tx = db.conn.unchecked_transaction()?;
    // Releasing is the holder check: it only matches the editor's own claim.
    if !db::release_checkout(&tx, ocr_result_id, editor)? {
        drop(tx);
        return Err(holder_conflict(db, ocr_result_id)?);
    }
    tx.execute(
        "INSERT INTO corrected_results (ocr_result_id, result, editor, check_out_time, check_in_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![ocr_result_id, text, editor, check_out_time, format_time(&now)],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE ocr_results SET corrected = 1 WHERE id = ?1",
        [ocr_result_id],
    )?;
    tx.execute(
        "UPDATE uploads SET status = ?2, modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1",
        rusqlite::params![upload.id, UploadStatus::Corrected],
    )?;
    tx.commit()?;

    info!("Correction {id} submitted by {editor} for OCR result {ocr_result_id}");
    db.get_corrected_result(id)?
        .ok_or_else(|| CatalogError::not_found("Corrected result", id))
}

/// Store the word-level accuracy (percent, two decimals) of a correction.
pub fn record_accuracy(db: &Database, corrected_result_id: i64, word_accuracy: Option<f64>) -> Result<i64> {
    db.get_corrected_result(corrected_result_id)?
        .ok_or_else(|| CatalogError::not_found("Corrected result", corrected_result_id))?;
    if let Some(existing) = db.get_accuracy_for_corrected(corrected_result_id)? {
        return Err(CatalogError::AlreadyExists {
            entity: "Accuracy",
            id: existing.id,
        });
    }

    let value = match word_accuracy {
        Some(v) if !(0.0..=100.0).contains(&v) => {
            let mut errors = ValidationErrors::default();
            errors.add("word_accuracy", format!("{v} is outside 0-100"));
            return Err(CatalogError::Validation(errors));
        }
        Some(v) => Some((v * 100.0).round() / 100.0),
        None => None,
    };
    Ok(db.insert_accuracy(corrected_result_id, value)?)
}

/// Attach an audio rendition (one or more download URLs) to a book.
pub fn add_audio_book(db: &Database, book_id: i64, username: Option<&str>, urls: &[String]) -> Result<i64> {
    db.get_book(book_id)?
        .ok_or_else(|| CatalogError::not_found("Book", book_id))?;
    if urls.iter().all(|u| u.trim().is_empty()) {
        let mut errors = ValidationErrors::default();
        errors.add("download_url", "This field is required.");
        return Err(CatalogError::Validation(errors));
    }
    let id = db.insert_audio_book(book_id, username, urls)?;
    info!("Audio book {id} added to book {book_id}");
    Ok(id)
}

pub fn mark_book_completed(db: &Database, book_id: i64, daisy_xml: &str) -> Result<()> {
    if !db.mark_book_completed(book_id, daisy_xml)? {
        return Err(CatalogError::not_found("Book", book_id));
    }
    info!("Book {book_id} marked completed");
    Ok(())
}

/// Percentage of a book's pages that went through OCR.
pub fn book_progress(db: &Database, book_id: i64) -> Result<u32> {
    db.get_book(book_id)?
        .ok_or_else(|| CatalogError::not_found("Book", book_id))?;
    Ok(db.book_progress(book_id)?)
}
