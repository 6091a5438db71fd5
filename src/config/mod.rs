use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::UPLOADED_IMAGES_DIR;

/// Where uploaded archives and page images are kept on disk.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MediaSettings {
    /// Media root; every stored path is relative to it.
    pub root: PathBuf,
    /// Subdirectory of the root that zip archives are unpacked into.
    pub images_uploaded: String,
    /// When set, walked page files are recorded relative to the last
    /// occurrence of this marker instead of relative to `root`.
    pub path_marker: Option<String>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        MediaSettings {
            root: default_media_root().unwrap_or_else(|_| PathBuf::from("media")),
            images_uploaded: UPLOADED_IMAGES_DIR.to_string(),
            path_marker: None,
        }
    }
}

impl MediaSettings {
    pub fn new(root: impl AsRef<Path>) -> Self {
        MediaSettings {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Stored form of an absolute path under the media root.
    pub fn relative_path(&self, path: &Path) -> String {
        let full = path.to_string_lossy().replace('\\', "/");
        if let Some(marker) = self.path_marker.as_deref() {
            return crate::paths::relative_to_marker(&full, marker).to_string();
        }
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => full,
        }
    }
}

/// Where a caller is sent after a successful submission.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RedirectSettings {
    pub after_import: String,
    pub after_add_page: String,
    /// `{id}` is replaced with the single-page book id.
    pub after_single_page: String,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        RedirectSettings {
            after_import: "/user_home".to_string(),
            after_add_page: "/upload/add_page".to_string(),
            after_single_page: "/single_page/{id}".to_string(),
        }
    }
}

impl RedirectSettings {
    pub fn single_page(&self, book_id: i64) -> String {
        self.after_single_page.replace("{id}", &book_id.to_string())
    }
}

/// Top-level digibook config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub media: MediaSettings,
    pub redirects: RedirectSettings,
}

impl AppConfig {
    /// Load config from ~/.digibook/config.toml. Returns default if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    pub fn display(&self) -> String {
        let mut lines = vec![
            "[media]".to_string(),
            format!("  root = \"{}\"", self.media.root.display()),
            format!("  images_uploaded = \"{}\"", self.media.images_uploaded),
        ];
        if let Some(ref marker) = self.media.path_marker {
            lines.push(format!("  path_marker = \"{marker}\""));
        }
        lines.push("[redirects]".to_string());
        lines.push(format!("  after_import = \"{}\"", self.redirects.after_import));
        lines.push(format!("  after_add_page = \"{}\"", self.redirects.after_add_page));
        lines.push(format!("  after_single_page = \"{}\"", self.redirects.after_single_page));
        lines.join("\n")
    }
}

/// Default media root: ~/.digibook/media
pub fn default_media_root() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".digibook").join("media"))
}

/// Path to the config file: ~/.digibook/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".digibook").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.digibook/config.toml
# Flags and env vars (DIGIBOOK_MEDIA_ROOT, DIGIBOOK_DB) override these values.

[media]
# root = "/srv/digibook/media"
# images_uploaded = "uploaded_images"
# path_marker = "/media/"

[redirects]
# after_import = "/user_home"
# after_add_page = "/upload/add_page"
# after_single_page = "/single_page/{id}"
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}
