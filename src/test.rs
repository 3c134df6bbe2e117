//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::config::Settings;
use crate::model::{Table, DEFAULT_SHEET_NAME};
use crate::{store, Config};
use std::path::Path;
use tempfile::TempDir;

/// Test environment with a polog home, its Config and a freshly created workbook.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a polog home and a workbook with the default layout, keeping three backups.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("polog");
        let settings = Settings {
            workbook_path: Some(temp_dir.path().join("Downloads").join("IT POs.xlsx")),
            backup_copies: Some(3),
            ..Settings::default()
        };
        let config = Config::create(&root, settings).unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    pub fn workbook_path(&self) -> &Path {
        self.config.workbook_path()
    }

    /// Reads the default sheet back from disk.
    pub fn table(&self) -> Table {
        store::load(self.workbook_path(), DEFAULT_SHEET_NAME).unwrap()
    }

    pub fn make_workbook_read_only(&self) {
        let mut perms = std::fs::metadata(self.workbook_path())
            .unwrap()
            .permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(self.workbook_path(), perms).unwrap();
    }
}
