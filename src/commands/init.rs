use crate::args::InitArgs;
use crate::commands::Out;
use crate::config::Settings;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What `init` set up.
#[derive(Debug, Clone, Serialize)]
pub struct Initialized {
    pub config_path: PathBuf,
    pub workbook_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_copies: u32,
}

/// Creates the polog home directory and `config.json`, and creates the workbook with the default
/// columns if it does not already exist.
///
/// # Arguments
/// - `polog_home` - The directory that holds the configuration, e.g. `$HOME/polog`
/// - `args` - Optional workbook path, backup directory, backup count and sheet name.
///
/// # Errors
/// - `ErrorType::Validation` if the workbook path is not an `.xlsx` file path.
/// - `ErrorType::Config` if any file operations fail.
pub fn init(polog_home: &Path, args: &InitArgs) -> Result<Out<Initialized>> {
    let settings = Settings {
        workbook_path: args.workbook().map(Path::to_path_buf),
        backup_dir: args.backup_dir().map(Path::to_path_buf),
        backup_copies: args.backup_copies(),
        sheet_name: args.sheet().map(str::to_string),
    };
    let config = Config::create(polog_home, settings)
        .context("Unable to create the polog directory and config")
        .pub_result(ErrorType::Config)?;
    let initialized = Initialized {
        config_path: config.config_path().to_path_buf(),
        workbook_path: config.workbook_path().to_path_buf(),
        backup_dir: config.backup_dir().to_path_buf(),
        backup_copies: config.backup_copies(),
    };
    Ok(Out::new(
        format!(
            "Successfully created the polog config. Purchase orders will be written to '{}'",
            initialized.workbook_path.display()
        ),
        initialized,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init() {
        let dir = TempDir::new().unwrap();
        let workbook = dir.path().join("IT POs.xlsx");
        let args = InitArgs::new(Some(workbook.clone()), None, Some(0), None);
        let out = init(&dir.path().join("polog"), &args).unwrap();
        let initialized = out.structure().unwrap();
        assert!(workbook.is_file());
        assert_eq!(initialized.workbook_path, workbook);
        assert_eq!(initialized.backup_copies, 1);
        assert!(out.message().contains("IT POs.xlsx"));
    }

    #[test]
    fn test_init_bad_workbook() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs::new(Some(dir.path().join("IT POs.xls")), None, None, None);
        let err = init(&dir.path().join("polog"), &args).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }
}
