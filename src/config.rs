//! Loading and saving the persisted exclusion list.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the configuration file, stored in the search root.
pub const CONFIG_FILE: &str = ".packrun";

/// Persisted configuration: the list of directory names excluded from
/// discovery.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl Config {
    /// Loads the configuration from `dir`. A missing file yields the default
    /// (empty) configuration; a malformed one is an error, since exclusion
    /// state that cannot be trusted would silently change what runs.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = config_path(dir);
        match fs::read(&path) {
            Ok(data) => {
                serde_json::from_slice(&data).map_err(|source| Error::ConfigError { path, source })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the configuration to `dir`, or deletes the file when the
    /// exclusion list is empty.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = config_path(dir);
        if self.exclusions.is_empty() {
            match fs::remove_file(&path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other.map_err(Error::from),
            }
        } else {
            fs::write(&path, serde_json::to_vec(self)?)?;
            Ok(())
        }
    }

    /// Adds a directory name to the exclusion list. Duplicates are ignored.
    pub fn exclude(&mut self, name: &str) {
        if !self.exclusions.iter().any(|e| e == name) {
            self.exclusions.push(name.to_string());
        }
    }

    /// Removes a directory name from the exclusion list.
    pub fn include(&mut self, name: &str) {
        self.exclusions.retain(|e| e != name);
    }
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Renders the exclusion list for display.
pub fn format_exclusions(exclusions: &[String]) -> String {
    format!("Excluded directories:\n\t{}", exclusions.join("\n\t"))
}
