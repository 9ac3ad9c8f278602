//! Settings file: parsing, defaults and persistence (spec §6.1), grounded in
//! `original_source/source/configuration.py` and `constants.py`.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::warn;

pub const CONFIGURATION_FILE: &str = "settings.ini";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 20;

const CONFIGURATION_FILE_TEMPLATE: &str = "; Archive downloader settings\n\
; Lines beginning with ';' are comments.\n\
[credentials]\n\
username={username}\n\
password={password}\n\
[downloads]\n\
directory={directory}\n\
filetype={filetype}\n\
[engine]\n\
should_use_threading={should_use_threading}\n\
concurrency_limit={concurrency_limit}\n\
should_rate_limit={should_rate_limit}\n";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}")]
    Parse { path: PathBuf },
}

/// One of the five e-book formats the Archive can render a work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filetype {
    Azw3,
    Epub,
    Html,
    Mobi,
    Pdf,
}

impl Filetype {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "AZW3" => Some(Filetype::Azw3),
            "EPUB" => Some(Filetype::Epub),
            "HTML" => Some(Filetype::Html),
            "MOBI" => Some(Filetype::Mobi),
            "PDF" => Some(Filetype::Pdf),
            _ => None,
        }
    }

    pub fn as_upper_str(&self) -> &'static str {
        match self {
            Filetype::Azw3 => "AZW3",
            Filetype::Epub => "EPUB",
            Filetype::Html => "HTML",
            Filetype::Mobi => "MOBI",
            Filetype::Pdf => "PDF",
        }
    }

    pub fn as_extension(&self) -> &'static str {
        match self {
            Filetype::Azw3 => "azw3",
            Filetype::Epub => "epub",
            Filetype::Html => "html",
            Filetype::Mobi => "mobi",
            Filetype::Pdf => "pdf",
        }
    }
}

impl Default for Filetype {
    fn default() -> Self {
        Filetype::Pdf
    }
}

/// Parsed and defaulted settings. Read at startup, mutated via
/// `update_settings`, persisted on every mutation.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub username: String,
    pub password: String,
    pub downloads_dir: PathBuf,
    pub filetype: Filetype,
    pub should_use_threading: bool,
    pub concurrency_limit: u32,
    pub should_rate_limit: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            downloads_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DOWNLOADS_DIR),
            filetype: Filetype::default(),
            should_use_threading: true,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            should_rate_limit: false,
        }
    }
}

impl Configuration {
    /// Loads settings from `path`. If the file does not exist, writes the
    /// defaults to it immediately (crash-safe bootstrap, spec §4.8 step 4)
    /// and returns those defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let defaults = Configuration::default();
            defaults.write_to_file(path)?;
            return Ok(defaults);
        }
        Self::parse_from_file(path)
    }

    /// Parses an existing settings file, falling back to per-field defaults
    /// (with a logged warning) on any missing or invalid value.
    pub fn parse_from_file(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|_| ConfigError::Parse {
            path: path.to_path_buf(),
        })?;
        let defaults = Configuration::default();

        let username = ini
            .get_from(Some("credentials"), "username")
            .unwrap_or("")
            .to_string();
        let password = ini
            .get_from(Some("credentials"), "password")
            .unwrap_or("")
            .to_string();

        let downloads_dir = ini
            .get_from(Some("downloads"), "directory")
            .map(PathBuf::from)
            .unwrap_or(defaults.downloads_dir.clone());

        let filetype = ini
            .get_from(Some("downloads"), "filetype")
            .and_then(|raw| match Filetype::parse(raw) {
                Some(filetype) => Some(filetype),
                None => {
                    warn!(value = raw, "invalid filetype in settings file, using default");
                    None
                }
            })
            .unwrap_or(defaults.filetype);

        let should_use_threading = ini
            .get_from(Some("engine"), "should_use_threading")
            .map(|raw| raw.trim() != "0")
            .unwrap_or(defaults.should_use_threading);

        let concurrency_limit = ini
            .get_from(Some("engine"), "concurrency_limit")
            .and_then(|raw| match raw.trim().parse::<u32>() {
                Ok(value) if value >= 1 => Some(value),
                _ => {
                    warn!(value = raw, "invalid concurrency_limit in settings file, keeping default");
                    None
                }
            })
            .unwrap_or(defaults.concurrency_limit);

        let should_rate_limit = ini
            .get_from(Some("engine"), "should_rate_limit")
            .map(|raw| raw.trim() == "1")
            .unwrap_or(defaults.should_rate_limit);

        Ok(Self {
            username,
            password,
            downloads_dir,
            filetype,
            should_use_threading,
            concurrency_limit,
            should_rate_limit,
        })
    }

    /// Writes the settings file using the fixed template header, resolving
    /// `downloads_dir` to an absolute path first.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let directory = self
            .downloads_dir
            .canonicalize()
            .unwrap_or_else(|_| self.downloads_dir.clone());

        let contents = CONFIGURATION_FILE_TEMPLATE
            .replace("{username}", &self.username)
            .replace("{password}", &self.password)
            .replace("{directory}", &directory.display().to_string())
            .replace("{filetype}", self.filetype.as_upper_str())
            .replace(
                "{should_use_threading}",
                if self.should_use_threading { "1" } else { "0" },
            )
            .replace("{concurrency_limit}", &self.concurrency_limit.to_string())
            .replace(
                "{should_rate_limit}",
                if self.should_rate_limit { "1" } else { "0" },
            );

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_bootstraps_defaults_when_missing() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CONFIGURATION_FILE);
        let config = Configuration::load(&path).expect("load");
        assert!(path.exists());
        assert_eq!(config.filetype, Filetype::Pdf);
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
    }

    #[test]
    fn round_trips_through_write_and_parse() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CONFIGURATION_FILE);
        let mut config = Configuration::default();
        config.username = "ada".into();
        config.password = "hunter2".into();
        config.filetype = Filetype::Epub;
        config.concurrency_limit = 4;
        config.should_rate_limit = true;
        config.downloads_dir = dir.path().to_path_buf();
        config.write_to_file(&path).expect("write");

        let reloaded = Configuration::parse_from_file(&path).expect("parse");
        assert_eq!(reloaded.username, "ada");
        assert_eq!(reloaded.filetype, Filetype::Epub);
        assert_eq!(reloaded.concurrency_limit, 4);
        assert!(reloaded.should_rate_limit);
    }

    #[test]
    fn invalid_filetype_falls_back_to_default() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CONFIGURATION_FILE);
        std::fs::write(
            &path,
            "[credentials]\nusername=\npassword=\n[downloads]\ndirectory=/tmp\nfiletype=DOCX\n[engine]\nshould_use_threading=1\nconcurrency_limit=20\nshould_rate_limit=0\n",
        )
        .expect("write");
        let config = Configuration::parse_from_file(&path).expect("parse");
        assert_eq!(config.filetype, Filetype::Pdf);
    }

    #[test]
    fn invalid_integer_keeps_default() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CONFIGURATION_FILE);
        std::fs::write(
            &path,
            "[credentials]\nusername=\npassword=\n[downloads]\ndirectory=/tmp\nfiletype=PDF\n[engine]\nshould_use_threading=1\nconcurrency_limit=not-a-number\nshould_rate_limit=0\n",
        )
        .expect("write");
        let config = Configuration::parse_from_file(&path).expect("parse");
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
    }
}
