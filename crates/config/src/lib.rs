//! Configuration loading for fastmail-tui
//!
//! Helpers for reading and writing JSON files in the shared config
//! directory (~/.config/fastmail-tui/). The mail core never calls these
//! directly during operation; the startup path resolves everything it
//! needs into plain structs first.
//!
//! Call [`init`] once at application startup to bootstrap the directory.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory name under the platform config root
const APP_DIR: &str = "fastmail-tui";

/// Initialize the config directory, creating it if needed.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the config directory (~/.config/fastmail-tui/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Save a value as pretty-printed JSON into the config directory
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    save_json_file(&dir.join(filename), value)
}

/// Save a value as pretty-printed JSON to an arbitrary path
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Read a trimmed single-line secret (e.g. an API token) from a file
pub fn read_secret_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read secret file: {}", path.display()))?;
    let secret = content.trim();
    if secret.is_empty() {
        anyhow::bail!("Secret file is empty: {}", path.display());
    }
    Ok(secret.to_string())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with(APP_DIR));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("mail.json").unwrap();
        assert!(path.ends_with("fastmail-tui/mail.json"));
    }

    #[test]
    fn test_json_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample.json");

        let value = Sample {
            name: "inbox".to_string(),
            count: 42,
        };
        save_json_file(&path, &value).unwrap();

        let loaded: Sample = load_json_file(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_read_secret_file_trims() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("token");
        std::fs::write(&path, "fmu1-abcdef123456\n").unwrap();

        let secret = read_secret_file(&path).unwrap();
        assert_eq!(secret, "fmu1-abcdef123456");
    }

    #[test]
    fn test_read_secret_file_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("token");
        std::fs::write(&path, "  \n").unwrap();

        assert!(read_secret_file(&path).is_err());
    }
}
