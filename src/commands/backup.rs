use crate::backup::{BackupFile, BackupInfo, RestoreInfo};
use crate::commands::Out;
use crate::error::{self, ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Backs up the workbook now, pruning old backups to the configured count.
pub fn backup_create(config: &Config) -> Result<Out<BackupInfo>> {
    let path = config.workbook_path();
    let result = if path.is_file() {
        config.backup().create(path)
    } else {
        Err(error::not_found(format!(
            "The workbook '{}' does not exist",
            path.display()
        )))
    };
    let info = result
        .context("Unable to back up the workbook")
        .pub_result(ErrorType::Backup)?;
    Ok(Out::new(
        format!(
            "Created backup {} ({} old backups removed)",
            info.path.display(),
            info.pruned.len()
        ),
        info,
    ))
}

/// Lists the backups of the workbook, newest first.
pub fn backup_list(config: &Config) -> Result<Out<Vec<BackupFile>>> {
    let backup = config.backup();
    let backups = backup
        .list(config.workbook_path())
        .context("Unable to list backups")
        .pub_result(ErrorType::Backup)?;
    let mut message = format!(
        "{} backups in {} (keeping {})",
        backups.len(),
        backup.backups_dir().display(),
        backup.backup_copies()
    );
    for b in &backups {
        let name = b.path.file_name().unwrap_or_default().to_string_lossy();
        message.push_str(&format!("\n  {}  {name}", b.created.format("%Y-%m-%d %H:%M:%S")));
    }
    Ok(Out::new(message, backups))
}

/// Replaces the workbook with `file`, or the latest backup. The current workbook is copied to a
/// safety file in the backup directory first.
pub fn backup_restore(config: &Config, file: Option<&Path>) -> Result<Out<RestoreInfo>> {
    let info = config
        .backup()
        .restore(config.workbook_path(), file)
        .context("Unable to restore the backup")
        .pub_result(ErrorType::Backup)?;
    let mut message = format!(
        "Restored '{}' from {}",
        config.workbook_path().display(),
        info.restored_from.display()
    );
    if let Some(safety) = &info.safety_copy {
        message.push_str(&format!(". The previous workbook was saved as {}", safety.display()));
    }
    Ok(Out::new(message, info))
}
