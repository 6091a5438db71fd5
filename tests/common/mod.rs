//! Shared fixtures for digibook integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use digibook::config::MediaSettings;
use digibook::db::models::NewLanguage;
use digibook::db::Database;

/// An isolated database file and media root under one temp directory.
pub struct Harness {
    pub temp: TempDir,
    pub db_path: PathBuf,
    pub media: MediaSettings,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("digibook.db");
        let media = MediaSettings::new(temp.path().join("media"));
        Harness {
            temp,
            db_path,
            media,
        }
    }

    /// A fresh connection to the harness database.
    pub fn open(&self) -> Database {
        Database::open(&self.db_path).unwrap()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    /// Write a zip of `entries` next to the database and return its path.
    pub fn zip(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.path(name);
        write_zip(&path, entries);
        path
    }

    pub fn image(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, b"\x89PNG").unwrap();
        path
    }
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

pub fn add_language(db: &Database, code: &str, name: &str) -> i64 {
    db.insert_language(&NewLanguage {
        code: code.into(),
        name: name.into(),
        postprocessing_enabled: false,
        dict_file: String::new(),
        vocab_file: String::new(),
    })
    .unwrap()
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}
