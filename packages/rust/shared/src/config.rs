//! Application configuration for scriptsync.
//!
//! User config lives at `~/.scriptsync/scriptsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScriptSyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "scriptsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".scriptsync";

// ---------------------------------------------------------------------------
// Config structs (matching scriptsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// How outline bookmarks are classified.
    #[serde(default)]
    pub outline: OutlineConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.scriptsync/scriptsync.db".into()
}

/// `[outline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineConfig {
    /// Bookmark sorts treated as chapters.
    #[serde(default = "default_chapter_sorts")]
    pub chapter_sorts: Vec<String>,

    /// Bookmark sorts treated as sections.
    #[serde(default = "default_section_sorts")]
    pub section_sorts: Vec<String>,

    /// Medium sort whose outline is reconciled against its lecture.
    #[serde(default = "default_script_sort")]
    pub script_sort: String,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            chapter_sorts: default_chapter_sorts(),
            section_sorts: default_section_sorts(),
            script_sort: default_script_sort(),
        }
    }
}

impl OutlineConfig {
    pub fn is_chapter(&self, sort: &str) -> bool {
        self.chapter_sorts.iter().any(|s| s == sort)
    }

    pub fn is_section(&self, sort: &str) -> bool {
        self.section_sorts.iter().any(|s| s == sort)
    }
}

fn default_chapter_sorts() -> Vec<String> {
    vec!["Kapitel".into(), "chapter".into()]
}
fn default_section_sorts() -> Vec<String> {
    vec!["Abschnitt".into(), "section".into()]
}
fn default_script_sort() -> String {
    "Script".into()
}

impl AppConfig {
    /// Database path with a leading `~/` expanded to the home directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.database_path)
    }
}

/// Expand a leading `~/` in a configured path.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ScriptSyncError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.scriptsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScriptSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.scriptsync/scriptsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScriptSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScriptSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScriptSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScriptSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScriptSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
