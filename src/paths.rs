//! Storage path naming for archives, page images and segmentation artifacts.
//!
//! Every function here is pure: the clock and random source are passed in by
//! the caller. Paths are `/`-separated and relative to the media root.

use chrono::NaiveDateTime;
use rand::Rng;
use std::path::Path;
use tracing::debug;

use crate::error::PageNumberParseError;

pub const COMPRESSED_INPUT_DIR: &str = "compressed_input";
pub const UPLOADED_IMAGES_DIR: &str = "uploaded_images";

const FIXED_SUFFIX: &str = ".fixed";
const PLOT_FILE_SUFFIX: &str = ".segmentation_plot_file";
const PLOT_IMAGE_SUFFIX: &str = ".segmentation_plot_image";

const RANDOM_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_LEN: usize = 8;

pub fn replace_space_with_underscore(s: &str) -> String {
    s.replace(' ', "_")
}

/// Human-readable form of a stored title.
pub fn display_title(s: &str) -> String {
    s.split('_').collect::<Vec<_>>().join(" ")
}

/// `YYYY-MM-DD_HHMMSS`
pub fn timestamp(now: &NaiveDateTime) -> String {
    now.format("%Y-%m-%d_%H%M%S").to_string()
}

/// Eight characters from `0-9A-Z`.
pub fn random_alphanumeric<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDOM_LEN)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// `compressed_input/<language_id>/<timestamp>_<title>/<filename>`
pub fn zip_upload_path(language_id: i64, title: &str, timestamp: &str, filename: &str) -> String {
    let dir = format!("{}_{}", timestamp, replace_space_with_underscore(title));
    let path = join(&[COMPRESSED_INPUT_DIR, &language_id.to_string(), &dir, filename]);
    debug!("Zip file upload path: {path}");
    path
}

/// `uploaded_images/<language_name>/<book_id>/<filename>`.
///
/// A missing or zero book id falls back to `<fallback()>_uncatalogued`; the
/// fallback is only called in that case.
pub fn image_upload_path<F>(language_name: &str, book_id: Option<i64>, filename: &str, fallback: F) -> String
where
    F: FnOnce() -> String,
{
    let dir = match book_id {
        Some(id) if id != 0 => id.to_string(),
        _ => format!("{}_uncatalogued", fallback()),
    };
    let path = join(&[UPLOADED_IMAGES_DIR, language_name, &dir, filename]);
    debug!("Image upload path: {path}");
    path
}

fn derived_artifact_path(image: &str, suffix: &str, filename: &str) -> String {
    let (dir, base) = match image.rfind('/') {
        Some(i) => (&image[..i], &image[i + 1..]),
        None => ("", image),
    };
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    join(&[dir, &format!("{stem}{suffix}{ext}")])
}

pub fn fixed_image_path(image: &str, filename: &str) -> String {
    derived_artifact_path(image, FIXED_SUFFIX, filename)
}

pub fn segmentation_plot_file_path(image: &str, filename: &str) -> String {
    derived_artifact_path(image, PLOT_FILE_SUFFIX, filename)
}

pub fn segmentation_plot_image_path(image: &str, filename: &str) -> String {
    derived_artifact_path(image, PLOT_IMAGE_SUFFIX, filename)
}

/// Page index encoded in a scan filename: last path segment, second
/// `.`-field, last `_`-piece. `book/scan.page_07.png` is page 7.
pub fn page_number_from_filename(path: &str) -> Result<u32, PageNumberParseError> {
    let fail = |reason: &str| PageNumberParseError {
        filename: path.to_string(),
        reason: reason.to_string(),
    };

    let name = path.rsplit('/').next().unwrap_or(path);
    let field = name
        .split('.')
        .nth(1)
        .ok_or_else(|| fail("expected at least two '.'-separated fields"))?;
    let piece = field.rsplit('_').next().unwrap_or(field);
    piece
        .parse::<u32>()
        .map_err(|_| fail(&format!("'{piece}' is not a page index")))
}

/// Portion of `path` after the last occurrence of `marker`.
pub fn relative_to_marker<'a>(path: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return path;
    }
    path.rsplit(marker).next().unwrap_or(path)
}
