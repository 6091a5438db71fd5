use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use digibook::config::{self, AppConfig};
use digibook::correction::{self, SegmentationArtifacts};
use digibook::db::models::{NewBook, NewLanguage, UploadStatus};
use digibook::db::Database;
use digibook::ingest::{self, form::PageForm, form::SinglePageForm, BookForm};
use digibook::output::{json as json_out, table};
use digibook::pages;
use digibook::search::filters::UploadFilter;

#[derive(Parser)]
#[command(name = "digibook", version, about = "Book digitization catalog: import scanned books and track every page through OCR and correction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to database file (default: ~/.digibook/digibook.db)
    #[arg(long, global = true, env = "DIGIBOOK_DB")]
    db: Option<PathBuf>,

    /// Media root for archives and page images (overrides config.toml)
    #[arg(long, global = true, env = "DIGIBOOK_MEDIA_ROOT")]
    media_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage OCR languages
    Language {
        #[command(subcommand)]
        action: LanguageCommand,
    },

    /// Import a book from a zip of page scans
    Import {
        /// Zip archive of page images
        zip_file: PathBuf,

        #[arg(long)]
        title: String,

        /// Language code or id
        #[arg(long)]
        language: String,

        #[arg(long, default_value = "")]
        author: String,

        /// Publication year (4 digits)
        #[arg(long, default_value = "")]
        year: String,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Request an audio rendition
        #[arg(long)]
        audio: bool,

        /// Preview without importing
        #[arg(long)]
        dry_run: bool,
    },

    /// Add one page to an existing book
    AddPage {
        image: PathBuf,

        #[arg(long)]
        language: String,

        /// Book id
        #[arg(long)]
        book: i64,
    },

    /// Add a lone page to the single-page book
    AddSinglePage {
        image: PathBuf,

        #[arg(long)]
        language: String,
    },

    /// Create the single-page book if it does not exist
    DemoBook {
        #[arg(long)]
        language: String,
    },

    /// List pages (or books with --books)
    List {
        /// List books instead of pages
        #[arg(long)]
        books: bool,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Full-text search over recognized page text
    Search {
        /// Search query (FTS5 syntax: phrases, boolean, prefix*)
        query: String,

        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show a book with its pages
    Show {
        /// Book id
        id: i64,
    },

    /// Move a page to another processing status
    Status {
        upload_id: i64,

        /// new, segmented, queued, fixed, processed, corrected or unusable
        status: UploadStatus,
    },

    /// Record a segmentation run for a page
    Segment {
        upload_id: i64,

        #[arg(long)]
        fixed_image: Option<String>,

        #[arg(long)]
        plot_file: Option<String>,

        #[arg(long)]
        plot_image: Option<String>,
    },

    /// Mark a segmentation as fixed by hand
    Fix {
        segmentation_id: i64,
    },

    /// Record OCR output for a segmented page
    Ocr {
        upload_id: i64,

        /// File holding the recognized text
        text_file: PathBuf,

        /// Raw OCR XML to keep with the page
        #[arg(long)]
        xml_file: Option<PathBuf>,
    },

    /// Record a low-confidence word and its suggestions
    ErrorWord {
        ocr_result_id: i64,

        word: String,

        /// Chosen correction
        corrected: String,

        /// Candidate correction (repeatable, in order)
        #[arg(long = "suggestion")]
        suggestions: Vec<String>,
    },

    /// Claim an OCR result for manual correction
    Checkout {
        ocr_result_id: i64,

        #[arg(long, env = "DIGIBOOK_EDITOR")]
        editor: String,
    },

    /// Give up a claim on an OCR result
    Release {
        ocr_result_id: i64,

        #[arg(long, env = "DIGIBOOK_EDITOR")]
        editor: String,
    },

    /// Submit the corrected text of a claimed OCR result
    Correct {
        ocr_result_id: i64,

        /// File holding the corrected text
        text_file: PathBuf,

        #[arg(long, env = "DIGIBOOK_EDITOR")]
        editor: String,
    },

    /// Record word accuracy (percent) of a correction
    Accuracy {
        corrected_result_id: i64,

        word_accuracy: Option<f64>,
    },

    /// Attach audio download URLs to a book
    Audio {
        book_id: i64,

        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(long)]
        username: Option<String>,
    },

    /// Mark a book completed
    Complete {
        book_id: i64,

        /// DAISY XML produced for the book
        #[arg(long)]
        daisy_file: Option<PathBuf>,
    },

    /// Show database statistics
    Stats,

    /// Delete a book with all its pages
    Delete {
        /// Book id
        id: i64,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Manage ~/.digibook/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Rebuild the OCR text index
    Reindex,

    /// Show database info
    Info,
}

#[derive(Subcommand)]
enum LanguageCommand {
    /// Register a language
    Add {
        code: String,
        name: String,

        #[arg(long)]
        postprocessing: bool,

        #[arg(long, default_value = "")]
        dict_file: String,

        #[arg(long, default_value = "")]
        vocab_file: String,
    },

    /// List languages
    List,

    /// Grant a user editor rights for a language
    Editor {
        /// Language code or id
        language: String,
        username: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a commented config template
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Filter by book title (partial match)
    #[arg(long)]
    book: Option<String>,

    /// Filter by recognized or corrected text (partial match)
    #[arg(long)]
    text: Option<String>,

    /// Filter by image path (partial match)
    #[arg(long)]
    image: Option<String>,

    #[arg(long)]
    status: Option<UploadStatus>,

    /// Filter by language code
    #[arg(long)]
    language: Option<String>,
}

impl From<FilterArgs> for UploadFilter {
    fn from(a: FilterArgs) -> Self {
        UploadFilter {
            book_title: a.book,
            text: a.text,
            image: a.image,
            status: a.status,
            language: a.language,
        }
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn read_text(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => run_config(&action, cli.json),
        command => run(command, cli.json, cli.db, cli.media_root),
    }
}

fn run(command: Commands, json_output: bool, db: Option<PathBuf>, media_root: Option<PathBuf>) -> Result<()> {
    let mut app = AppConfig::load()?;
    if let Some(root) = media_root {
        app.media.root = root;
    }
    let media = &app.media;
    let redirects = &app.redirects;

    let db_path = match db {
        Some(path) => path,
        None => Database::default_db_path()?,
    };
    let db = Database::open(&db_path)?;

    match command {
        Commands::Language { action } => match action {
            LanguageCommand::Add {
                code,
                name,
                postprocessing,
                dict_file,
                vocab_file,
            } => {
                let id = db.insert_language(&NewLanguage {
                    code: code.clone(),
                    name,
                    postprocessing_enabled: postprocessing,
                    dict_file,
                    vocab_file,
                })?;
                if json_output {
                    json_out::print_json(&serde_json::json!({ "id": id, "code": code }))?;
                } else {
                    println!("Added language {code} ({id})");
                }
            }
            LanguageCommand::List => {
                let languages = db.list_languages()?;
                if json_output {
                    json_out::print_json(&languages)?;
                } else {
                    table::print_languages(&languages);
                }
            }
            LanguageCommand::Editor { language, username } => {
                let lang = db
                    .find_language(&language)?
                    .with_context(|| format!("Language not found: {language}"))?;
                db.add_language_editor(lang.id, &username)?;
                let editors = db.get_language_editors(lang.id)?;
                if json_output {
                    json_out::print_json(&serde_json::json!({ "language": lang.code, "editors": editors }))?;
                } else {
                    println!("Editors of {}: {}", lang.code, editors.join(", "));
                }
            }
        },

        Commands::Import {
            zip_file,
            title,
            language,
            author,
            year,
            tags,
            audio,
            dry_run,
        } => {
            let form = BookForm {
                zip_file,
                title,
                language,
                author,
                year,
                tags,
                is_audio_required: audio,
            };

            if dry_run {
                let entries = ingest::preview_book(&db, &form)?;
                if json_output {
                    json_out::print_json(&entries)?;
                } else {
                    table::print_preview(&entries);
                }
                return Ok(());
            }

            let report = ingest::import_book(&db, media, &form, now())?;
            if json_output {
                json_out::print_json(&json_out::with_redirect(&report, &redirects.after_import)?)?;
            } else {
                table::print_import_report(&report);
                println!("-> {}", redirects.after_import);
            }
        }

        Commands::AddPage {
            image,
            language,
            book,
        } => {
            let upload = pages::add_page(&db, media, &PageForm { image, language, book })?;
            if json_output {
                json_out::print_json(&json_out::with_redirect(&upload, &redirects.after_add_page)?)?;
            } else {
                table::print_upload(&upload);
                println!("-> {}", redirects.after_add_page);
            }
        }

        Commands::AddSinglePage { image, language } => {
            let upload = pages::add_single_page(&db, media, &SinglePageForm { image, language })?;
            let target = redirects.single_page(upload.book_id);
            if json_output {
                json_out::print_json(&json_out::with_redirect(&upload, &target)?)?;
            } else {
                table::print_upload(&upload);
                println!("-> {target}");
            }
        }

        Commands::DemoBook { language } => {
            let id = match pages::resolve_single_page_book_id(&db)? {
                Some(id) => id,
                None => {
                    let lang = db
                        .find_language(&language)?
                        .with_context(|| format!("Language not found: {language}"))?;
                    db.insert_book(&NewBook {
                        title: pages::SINGLE_PAGE_BOOK_TITLE.to_string(),
                        language_id: lang.id,
                        ..Default::default()
                    })?
                }
            };
            if json_output {
                json_out::print_json(&serde_json::json!({ "book_id": id }))?;
            } else {
                println!("Single-page book: {id}");
            }
        }

        Commands::List {
            books,
            filter,
            limit,
        } => {
            if books {
                let results = db.list_books(limit)?;
                if json_output {
                    json_out::print_json(&results)?;
                } else {
                    table::print_book_list(&results);
                }
            } else {
                let rows = db.list_uploads(&filter.into(), limit)?;
                if json_output {
                    json_out::print_json(&rows)?;
                } else {
                    table::print_upload_list(&rows);
                }
            }
        }

        Commands::Search {
            query,
            filter,
            limit,
        } => {
            let hits = db.search_text(&query, &filter.into(), limit)?;
            if json_output {
                json_out::print_json(&digibook::search::SearchOutput {
                    query,
                    total: hits.len(),
                    hits,
                })?;
            } else {
                table::print_search_results(&hits, &query);
            }
        }

        Commands::Show { id } => {
            let book = db
                .get_book(id)?
                .with_context(|| format!("Book not found: {id}"))?;
            let language = db.get_language(book.language_id)?;
            let tags = db.get_book_tags(id)?;
            let uploads = db.get_uploads_for_book(id)?;
            let audio = db.get_audio_books(id)?;
            let progress = db.book_progress(id)?;

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "book": book,
                    "language": language,
                    "tags": tags,
                    "uploads": uploads,
                    "audio_books": audio,
                    "progress": progress,
                }))?;
            } else {
                table::print_book_detail(&book, language.as_ref(), &tags, &uploads, &audio, progress);
            }
        }

        Commands::Status { upload_id, status } => {
            let upload = correction::set_upload_status(&db, upload_id, status)?;
            if json_output {
                json_out::print_json(&upload)?;
            } else {
                table::print_upload(&upload);
            }
        }

        Commands::Segment {
            upload_id,
            fixed_image,
            plot_file,
            plot_image,
        } => {
            let artifacts = SegmentationArtifacts {
                fixed_image,
                plot_file,
                plot_image,
            };
            let seg = correction::record_segmentation(&db, upload_id, &artifacts)?;
            if json_output {
                json_out::print_json(&seg)?;
            } else {
                println!("Segmentation {} recorded for upload {upload_id}", seg.id);
                for path in [&seg.fixed_image, &seg.segmentation_plot_file, &seg.segmentation_plot_image]
                    .into_iter()
                    .flatten()
                {
                    println!("  {path}");
                }
            }
        }

        Commands::Fix { segmentation_id } => {
            let seg = correction::mark_manually_fixed(&db, segmentation_id)?;
            if json_output {
                json_out::print_json(&seg)?;
            } else {
                println!("Segmentation {} marked as manually fixed", seg.id);
            }
        }

        Commands::Ocr {
            upload_id,
            text_file,
            xml_file,
        } => {
            let started = now();
            let text = read_text(&text_file)?;
            let xml = xml_file.as_ref().map(read_text).transpose()?;
            let ocr = correction::record_ocr(&db, upload_id, &text, xml.as_deref(), started, now())?;
            if json_output {
                json_out::print_json(&ocr)?;
            } else {
                println!("OCR result {} recorded for upload {upload_id}", ocr.id);
            }
        }

        Commands::ErrorWord {
            ocr_result_id,
            word,
            corrected,
            suggestions,
        } => {
            let id = correction::add_error_word(&db, ocr_result_id, &word, &corrected, &suggestions)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Error word {id} recorded ({} suggestions)", suggestions.len());
            }
        }

        Commands::Checkout {
            ocr_result_id,
            editor,
        } => {
            let ocr = correction::checkout(&db, ocr_result_id, &editor, now())?;
            if json_output {
                json_out::print_json(&ocr)?;
            } else {
                println!("OCR result {ocr_result_id} checked out by {editor}");
            }
        }

        Commands::Release {
            ocr_result_id,
            editor,
        } => {
            correction::release(&db, ocr_result_id, &editor)?;
            println!("OCR result {ocr_result_id} released");
        }

        Commands::Correct {
            ocr_result_id,
            text_file,
            editor,
        } => {
            let text = read_text(&text_file)?;
            let corrected = correction::submit_correction(&db, ocr_result_id, &editor, &text, now())?;
            if json_output {
                json_out::print_json(&corrected)?;
            } else {
                println!("Correction {} checked in by {editor}", corrected.id);
            }
        }

        Commands::Accuracy {
            corrected_result_id,
            word_accuracy,
        } => {
            let id = correction::record_accuracy(&db, corrected_result_id, word_accuracy)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Accuracy {id} recorded for correction {corrected_result_id}");
            }
        }

        Commands::Audio {
            book_id,
            urls,
            username,
        } => {
            let id = correction::add_audio_book(&db, book_id, username.as_deref(), &urls)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("Audio book {id} added to book {book_id}");
            }
        }

        Commands::Complete { book_id, daisy_file } => {
            let daisy = daisy_file.as_ref().map(read_text).transpose()?.unwrap_or_default();
            correction::mark_book_completed(&db, book_id, &daisy)?;
            println!("Book {book_id} completed");
        }

        Commands::Stats => {
            let stats = db.stats()?;
            if json_output {
                json_out::print_json(&stats)?;
            } else {
                table::print_stats(&stats);
            }
        }

        Commands::Delete { id, force } => {
            let book = db
                .get_book(id)?
                .with_context(|| format!("Book not found: {id}"))?;

            if !force {
                eprint!("Delete \"{}\" ({}) and all its pages? [y/N] ", book.display_name(), id);
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            db.delete_book(id)?;
            println!("Deleted: {} ({})", book.display_name(), id);
        }

        Commands::Config { action } => run_config(&action, json_output)?,

        Commands::Reindex => {
            println!("Rebuilding FTS5 index...");
            db.reindex()?;
            println!("Done.");
        }

        Commands::Info => {
            let stats = db.stats()?;
            let schema_ver: String = db
                .conn
                .query_row(
                    "SELECT value FROM digibook_meta WHERE key = 'schema_version'",
                    [],
                    |r| r.get(0),
                )
                .unwrap_or_else(|_| "unknown".to_string());

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "schema_version": schema_ver,
                    "db_path": db.path.display().to_string(),
                    "db_size_bytes": stats.db_size_bytes,
                    "media_root": media.root.display().to_string(),
                    "books": stats.books,
                    "uploads": stats.uploads,
                }))?;
            } else {
                println!("digibook v{}", env!("CARGO_PKG_VERSION"));
                println!("  Schema:     v{schema_ver}");
                println!("  Database:   {}", db.path.display());
                println!("  Size:       {}", table::format_bytes(stats.db_size_bytes));
                println!("  Media root: {}", media.root.display());
                println!("  Books:      {}", stats.books);
                println!("  Pages:      {}", stats.uploads);
            }
        }
    }

    Ok(())
}

fn run_config(action: &ConfigCommand, json_output: bool) -> Result<()> {
    match action {
        ConfigCommand::Init => {
            let path = config::config_path()?;
            if config::init_config()? {
                println!("Wrote {}", path.display());
            } else {
                bail!("Config already exists: {}", path.display());
            }
        }
        ConfigCommand::Show => {
            let app = AppConfig::load()?;
            if json_output {
                json_out::print_json(&app)?;
            } else {
                println!("{}", app.display());
            }
        }
    }
    Ok(())
}
