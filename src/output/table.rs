use unicode_width::UnicodeWidthStr;

use crate::db::models::*;
use crate::ingest::{ImportReport, PreviewEntry};
use crate::search::{TextHit, UploadRow};

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
pub fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Left-align `s` in a column of `width` display cells.
fn pad(s: &str, width: usize) -> String {
    let s = truncate(s, width);
    let fill = width.saturating_sub(UnicodeWidthStr::width(s.as_str()));
    format!("{s}{}", " ".repeat(fill))
}

fn page_label(page: Option<u32>) -> String {
    page.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
}

pub fn print_languages(languages: &[Language]) {
    if languages.is_empty() {
        println!("No languages configured.");
        return;
    }
    println!("  {:<6} {:<8} {:<24} {}", "ID", "CODE", "NAME", "POSTPROCESSING");
    println!("  {}", "-".repeat(56));
    for l in languages {
        println!(
            "  {:<6} {:<8} {} {}",
            l.id,
            l.code,
            pad(&l.name, 24),
            if l.postprocessing_enabled { "yes" } else { "no" }
        );
    }
}

pub fn print_book_list(books: &[Book]) {
    if books.is_empty() {
        println!("No books found.");
        return;
    }

    println!("{} book{}:\n", books.len(), plural(books.len()));
    println!("  {:<6} {} {} {:<6} {}", "ID", pad("TITLE", 40), pad("AUTHOR", 20), "YEAR", "DONE");
    println!("  {}", "-".repeat(80));
    for b in books {
        println!(
            "  {:<6} {} {} {:<6} {}",
            b.id,
            pad(&b.display_name(), 40),
            pad(&b.author, 20),
            b.year,
            if b.completed { "yes" } else { "" }
        );
    }
}

/// Format a single book for `digibook show`.
pub fn print_book_detail(
    book: &Book,
    language: Option<&Language>,
    tags: &[String],
    uploads: &[Upload],
    audio: &[AudioBook],
    progress: u32,
) {
    println!("Book: {}", book.display_name());
    println!("  ID:        {}", book.id);
    if !book.author.is_empty() {
        println!("  Author:    {}", book.author);
    }
    if !book.year.is_empty() {
        println!("  Year:      {}", book.year);
    }
    if let Some(l) = language {
        println!("  Language:  {} ({})", l.name, l.code);
    }
    println!("  Archive:   {}", book.zip_file);
    println!("  Pages:     {} ({progress}% processed)", uploads.len());
    if book.is_audio_required {
        println!("  Audio:     required");
    }
    if book.completed {
        println!("  Completed: yes");
    }
    if !tags.is_empty() {
        println!("  Tags:      {}", tags.join(", "));
    }

    for a in audio {
        println!("  Audio {}: {}", a.id, a.download_urls().join(" "));
    }

    if !uploads.is_empty() {
        println!();
        for u in uploads {
            println!(
                "  p.{:<5} #{:<6} {:<10} {}",
                page_label(u.page_number),
                u.id,
                u.status,
                truncate(&u.image, 56)
            );
        }
    }
}

pub fn print_upload(upload: &Upload) {
    println!(
        "Page {} of book {} (upload {}): {}",
        page_label(upload.page_number),
        upload.book_id,
        upload.id,
        upload.image
    );
    println!("  Status: {}", upload.status.label());
}

pub fn print_upload_list(rows: &[UploadRow]) {
    if rows.is_empty() {
        println!("No pages found.");
        return;
    }

    println!("{} page{}:\n", rows.len(), plural(rows.len()));
    println!("  {:<6} {} {:<6} {:<10} {}", "ID", pad("BOOK", 30), "PAGE", "STATUS", "IMAGE");
    println!("  {}", "-".repeat(90));
    for r in rows {
        println!(
            "  {:<6} {} {:<6} {:<10} {}",
            r.id,
            pad(&crate::paths::display_title(&r.book_title), 30),
            page_label(r.page_number),
            r.status,
            truncate(&r.image, 40)
        );
    }
}

pub fn print_search_results(hits: &[TextHit], query: &str) {
    if hits.is_empty() {
        println!("No results for \"{query}\"");
        return;
    }

    println!("{} result{} for \"{}\":\n", hits.len(), plural(hits.len()), query);
    for h in hits {
        println!(
            "  {} p.{} (upload {})",
            truncate(&crate::paths::display_title(&h.book_title), 50),
            page_label(h.page_number),
            h.upload_id
        );
        if !h.snippet.is_empty() {
            let snippet = h.snippet.replace('\n', " ");
            println!("  {}\n", truncate(&format!("  {snippet}"), 76));
        }
    }
}

pub fn print_import_report(report: &ImportReport) {
    println!(
        "Imported \"{}\" (book {}) with {} page{}",
        report.book.display_name(),
        report.book.id,
        report.uploads.len(),
        plural(report.uploads.len())
    );
    println!("  Archive:   {}", report.book.zip_file);
    println!("  Extracted: {}", report.extract_dir.display());
}

pub fn print_preview(entries: &[PreviewEntry]) {
    let ok = entries.iter().filter(|e| e.error.is_none()).count();
    println!("[dry-run] {ok} of {} entr{} would be imported:\n", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    for e in entries {
        match (&e.page_number, &e.error) {
            (Some(p), _) => println!("  p.{p:<5} {}", e.name),
            (None, Some(err)) => println!("  ERROR   {}: {err}", e.name),
            (None, None) => println!("  ?       {}", e.name),
        }
    }
}

/// Print database stats.
pub fn print_stats(stats: &DbStats) {
    println!("Database Statistics:");
    println!("  Languages:     {}", stats.languages);
    println!("  Books:         {} ({} completed)", stats.books, stats.completed_books);
    println!("  Pages:         {}", stats.uploads);
    println!("  OCR results:   {}", stats.ocr_results);
    println!("  Corrections:   {}", stats.corrected_results);
    println!("  Audio books:   {}", stats.audio_books);
    println!("  DB Size:       {}", format_bytes(stats.db_size_bytes));
    if !stats.statuses.is_empty() {
        println!("\n  Pages by status:");
        for sc in &stats.statuses {
            println!("    {:<12} {}", sc.status, sc.count);
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        // wide characters count two cells each
        assert_eq!(truncate("ಕನ್ನಡ ಪುಸ್ತಕ", 100), "ಕನ್ನಡ ಪುಸ್ತಕ");
        assert_eq!(truncate("漢字漢字漢字", 7), "漢字...");
    }

    #[test]
    fn test_pad_fills_to_width() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("漢", 4), "漢  ");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1_048_576), "5.0 MB");
    }
}
