//! Configuration file handling for polog.
//!
//! The configuration file is stored at `$POLOG_HOME/config.json` and holds the location of the
//! workbook, the backup settings, the sheet to use and how PO numbers are generated.

use crate::backup::{self, Backup};
use crate::error::{ErrorType, IntoResult};
use crate::model::{Headers, DEFAULT_SHEET_NAME};
use crate::{fs, store};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "polog";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const DEFAULT_WORKBOOK: &str = "IT POs.xlsx";
const BACKUP_COPIES: u32 = 1;
const PO_PREFIX: &str = "IT";
const PO_START: u64 = 579;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$POLOG_HOME` and from there it loads `$POLOG_HOME/config.json`. Relative paths in
/// the file are resolved against `$POLOG_HOME`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    workbook_path: PathBuf,
    backup_dir: PathBuf,
}

/// Settings chosen by the user during `polog init`. Anything left as `None` takes its default.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub workbook_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub backup_copies: Option<u32>,
    pub sheet_name: Option<String>,
}

impl Config {
    /// Creates the home directory and an initial `config.json`, then creates the workbook with the
    /// default columns if it does not exist yet. An existing workbook is left untouched.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if the workbook path is not a usable `.xlsx` path.
    /// - Returns an error if any file operations fail.
    pub(crate) fn create(dir: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let maybe_relative = dir.into();
        fs::create_dir_all(&maybe_relative).context("Unable to create the polog home directory")?;
        let root = fs::canonicalize(&maybe_relative)?;
        let config_path = root.join(CONFIG_JSON);

        let workbook_path = match settings.workbook_path {
            Some(p) => store::validate_workbook_path(&absolute(p)?.to_string_lossy())?,
            None => default_workbook_path(),
        };
        let backup_dir = settings.backup_dir.map(absolute).transpose()?;

        let config_file = ConfigFile {
            workbook_path,
            backup_dir,
            backup_copies: backup::clamp_copies(settings.backup_copies.unwrap_or(BACKUP_COPIES)),
            sheet_name: settings
                .sheet_name
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ..ConfigFile::default()
        };
        config_file.save(&config_path)?;

        let config = Self::resolve(root, config_path, config_file);
        if !config.workbook_path.is_file() {
            let sheet = config.sheet_name().unwrap_or(DEFAULT_SHEET_NAME);
            store::create(&config.workbook_path, sheet, &Headers::default_layout())
                .context("Unable to create the workbook")?;
        }
        Ok(config)
    }

    /// This will
    /// - validate that `polog_home` exists and that the config file exists
    /// - load and validate the config file
    /// - return the loaded configuration object
    ///
    /// # Errors
    /// - `ErrorType::Config` if the directory or file is missing or invalid.
    pub fn load(polog_home: impl Into<PathBuf>) -> crate::Result<Self> {
        Self::load_inner(polog_home.into()).pub_result(ErrorType::Config)
    }

    fn load_inner(polog_home: PathBuf) -> Result<Self> {
        let root = fs::canonicalize(&polog_home)
            .context("The polog home directory is missing, run 'polog init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!(
                "The config file is missing '{}', run 'polog init' first",
                config_path.display()
            )
        }
        let config_file = ConfigFile::load(&config_path)?;
        Ok(Self::resolve(root, config_path, config_file))
    }

    fn resolve(root: PathBuf, config_path: PathBuf, config_file: ConfigFile) -> Self {
        let workbook_path = resolve_path(&root, &config_file.workbook_path);
        let backup_dir = match &config_file.backup_dir {
            Some(dir) => resolve_path(&root, dir),
            None => backup::default_dir(&workbook_path),
        };
        debug!(
            "Workbook is {}, backups go to {}",
            workbook_path.display(),
            backup_dir.display()
        );
        Self {
            root,
            config_path,
            config_file,
            workbook_path,
            backup_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn workbook_path(&self) -> &Path {
        &self.workbook_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn backup_copies(&self) -> u32 {
        backup::clamp_copies(self.config_file.backup_copies)
    }

    /// The configured sheet, or `None` to pick one from the workbook.
    pub fn sheet_name(&self) -> Option<&str> {
        self.config_file.sheet_name.as_deref()
    }

    pub fn po_prefix(&self) -> &str {
        &self.config_file.po_prefix
    }

    pub fn po_start(&self) -> u64 {
        self.config_file.po_start
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::from_config(self)
    }
}

/// `~/Downloads/IT POs.xlsx`, falling back to the home directory and then the current directory.
fn default_workbook_path() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_default()
        .join(DEFAULT_WORKBOOK)
}

/// Makes a path given on the command line absolute, relative to the working directory.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Unable to get the current directory")?;
    Ok(cwd.join(path))
}

fn resolve_path(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "polog",
///   "config_version": 1,
///   "workbook_path": "/home/me/Downloads/IT POs.xlsx",
///   "backup_copies": 1,
///   "po_prefix": "IT",
///   "po_start": 579
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "polog"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// The workbook that purchase orders are written to
    workbook_path: PathBuf,

    /// Where backups are written. Defaults to `PO_Backups` beside the workbook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_dir: Option<PathBuf>,

    /// Number of backup copies to keep
    #[serde(default = "default_backup_copies")]
    backup_copies: u32,

    /// The sheet to use. When absent the sheet is chosen from the workbook's sheet names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sheet_name: Option<String>,

    /// The text before the number in a PO number, e.g. `IT` in `IT579`
    #[serde(default = "default_po_prefix")]
    po_prefix: String,

    /// The first PO number used in a new log
    #[serde(default = "default_po_start")]
    po_start: u64,
}

fn default_backup_copies() -> u32 {
    BACKUP_COPIES
}

fn default_po_prefix() -> String {
    PO_PREFIX.to_string()
}

fn default_po_start() -> u64 {
    PO_START
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            workbook_path: default_workbook_path(),
            backup_dir: None,
            backup_copies: BACKUP_COPIES,
            sheet_name: None,
            po_prefix: default_po_prefix(),
            po_start: PO_START,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or is not a polog config file.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "The config file version {} is newer than this program supports ({})",
            config.config_version,
            CONFIG_VERSION
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        fs::write(p, data).context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorType};
    use tempfile::TempDir;

    #[test]
    fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("polog_home");
        let workbook = dir.path().join("books").join("IT POs.xlsx");
        let settings = Settings {
            workbook_path: Some(workbook.clone()),
            backup_copies: Some(3),
            ..Settings::default()
        };

        let config = Config::create(&home, settings).unwrap();

        assert!(config.config_path().is_file());
        assert_eq!(config.workbook_path(), workbook);
        assert_eq!(
            config.backup_dir(),
            dir.path().join("books").join(backup::BACKUP_DIR_NAME)
        );
        assert_eq!(config.backup_copies(), 3);
        assert_eq!(config.sheet_name(), None);
        assert_eq!(config.po_prefix(), "IT");
        assert_eq!(config.po_start(), 579);

        // the workbook is created with the default layout
        let table = store::load(&workbook, DEFAULT_SHEET_NAME).unwrap();
        assert_eq!(table.headers(), &Headers::default_layout());
    }

    #[test]
    fn test_config_create_keeps_existing_workbook() {
        let dir = TempDir::new().unwrap();
        let workbook = dir.path().join("IT POs.xlsx");
        store::create(&workbook, "2026", &Headers::sanitize(["PO#", "Vendor"])).unwrap();
        let settings = Settings {
            workbook_path: Some(workbook.clone()),
            sheet_name: Some("2026".into()),
            ..Settings::default()
        };
        Config::create(dir.path().join("home"), settings).unwrap();
        assert_eq!(
            store::load(&workbook, "2026").unwrap().headers().names(),
            &["PO#", "Vendor"]
        );
    }

    #[test]
    fn test_config_create_rejects_bad_workbook_path() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            workbook_path: Some(dir.path().join("IT POs.csv")),
            ..Settings::default()
        };
        let err = Config::create(dir.path().join("home"), settings).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Validation));
    }

    #[test]
    fn test_config_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let settings = Settings {
            workbook_path: Some(dir.path().join("IT POs.xlsx")),
            backup_dir: Some(dir.path().join("elsewhere")),
            backup_copies: Some(100),
            sheet_name: Some(" PO Log ".into()),
        };
        let created = Config::create(&home, settings).unwrap();
        let loaded = Config::load(&home).unwrap();
        assert_eq!(created.config_file, loaded.config_file);
        assert_eq!(loaded.backup_dir(), dir.path().join("elsewhere"));
        assert_eq!(loaded.backup_copies(), backup::MAX_COPIES);
        assert_eq!(loaded.sheet_name(), Some("PO Log"));
        assert_eq!(loaded.backup().backups_dir(), dir.path().join("elsewhere"));
    }

    #[test]
    fn test_config_load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("nope")).is_err());
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn test_config_load_relative_paths() {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let json = r#"{
            "app_name": "polog",
            "config_version": 1,
            "workbook_path": "data/IT POs.xlsx"
        }"#;
        std::fs::write(root.join(CONFIG_JSON), json).unwrap();
        let config = Config::load(&root).unwrap();
        assert_eq!(config.workbook_path(), root.join("data").join("IT POs.xlsx"));
        assert_eq!(config.backup_dir(), root.join("data").join("PO_Backups"));
        assert_eq!(config.backup_copies(), 1);
        assert_eq!(config.po_prefix(), "IT");
    }

    #[test]
    fn test_config_file_wrong_app() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        std::fs::write(
            &path,
            r#"{"app_name": "other", "config_version": 1, "workbook_path": "x.xlsx"}"#,
        )
        .unwrap();
        let err = ConfigFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("app_name"));
    }

    #[test]
    fn test_config_file_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let original = ConfigFile {
            workbook_path: PathBuf::from("/x/IT POs.xlsx"),
            sheet_name: Some("2026".into()),
            po_prefix: "HR".into(),
            po_start: 1,
            ..ConfigFile::default()
        };
        original.save(&path).unwrap();
        assert_eq!(original, ConfigFile::load(&path).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("backup_dir"));
    }
}
