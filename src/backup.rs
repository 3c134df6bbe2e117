//! Timestamped backups of the workbook, with rotation and restore.
//!
//! A backup is a byte-for-byte copy of the workbook named `<stem>-<YYYYmmdd-HHMMSS-micros>.xlsx`
//! in the backup directory. After each new backup only the `backup_copies` most recent are kept.
//! Restoring first copies the current workbook to `<stem>-restore-safety-<timestamp>.xlsx`, which
//! is never rotated away.

use crate::{error, fs, Config};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The name of the backup directory created beside the workbook when none is configured.
pub const BACKUP_DIR_NAME: &str = "PO_Backups";

/// The fewest and most backups that may be retained.
pub const MIN_COPIES: u32 = 1;
pub const MAX_COPIES: u32 = 25;

const EXTENSION: &str = "xlsx";
const SAFETY_MARKER: &str = "restore-safety";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";

/// Manages backup file creation and rotation.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
}

/// The result of creating a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// The new backup file.
    pub path: PathBuf,
    /// Older backups that were deleted to stay within the retention count.
    pub pruned: Vec<PathBuf>,
}

/// A backup file found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub created: DateTime<Local>,
}

/// The result of restoring a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreInfo {
    pub restored_from: PathBuf,
    /// The copy of the workbook taken before it was replaced, if there was one.
    pub safety_copy: Option<PathBuf>,
}

impl Backup {
    /// `backup_copies` is clamped to `MIN_COPIES..=MAX_COPIES`.
    pub fn new(backups_dir: impl Into<PathBuf>, backup_copies: u32) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            backup_copies: clamp_copies(backup_copies),
        }
    }

    /// Creates a new `Backup` instance from a `Config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backup_dir(), config.backup_copies())
    }

    /// Backups kept in `PO_Backups` next to `workbook_path`.
    pub fn beside(workbook_path: &Path, backup_copies: u32) -> Self {
        Self::new(default_dir(workbook_path), backup_copies)
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    pub fn backup_copies(&self) -> u32 {
        self.backup_copies
    }

    /// Copies the workbook into the backup directory, then deletes the oldest backups beyond the
    /// retention count. Failing to delete an old backup is logged and does not fail the backup.
    pub fn create(&self, workbook_path: &Path) -> Result<BackupInfo> {
        let stem = stem(workbook_path)?;
        fs::create_dir_all(&self.backups_dir)?;
        let path = self.unused_path(&stem, "")?;
        fs::copy(workbook_path, &path).context("Unable to create a backup of the workbook")?;
        debug!("Created backup {}", path.display());
        let pruned = self.rotate(&stem)?;
        Ok(BackupInfo { path, pruned })
    }

    /// The backups of `workbook_path`, newest first. Safety copies are not included.
    pub fn list(&self, workbook_path: &Path) -> Result<Vec<BackupFile>> {
        let stem = stem(workbook_path)?;
        let mut backups = Vec::new();
        for path in fs::list_files(&self.backups_dir)? {
            let is_backup = path
                .file_name()
                .map(|name| is_backup_file(&name.to_string_lossy(), &stem))
                .unwrap_or(false);
            if is_backup {
                let created = DateTime::from(fs::created(&path)?);
                backups.push(BackupFile { path, created });
            }
        }
        backups.sort_by_key(|b| Reverse((b.created, b.path.file_name().map(|n| n.to_owned()))));
        Ok(backups)
    }

    /// The most recent backup of `workbook_path`, if any.
    pub fn latest(&self, workbook_path: &Path) -> Result<Option<BackupFile>> {
        Ok(self.list(workbook_path)?.into_iter().next())
    }

    /// Replaces the workbook with `backup_file`, or with the latest backup when `None`.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `backup_file` is not in the backup directory.
    /// - `ErrorType::NotFound` if the backup does not exist or there are no backups.
    /// - `ErrorType::Access` if the workbook cannot be replaced.
    pub fn restore(&self, workbook_path: &Path, backup_file: Option<&Path>) -> Result<RestoreInfo> {
        let source = match backup_file {
            Some(file) => self.resolve(file)?,
            None => self
                .latest(workbook_path)?
                .map(|b| b.path)
                .ok_or_else(|| {
                    error::not_found(format!(
                        "There are no backups of '{}' in {}",
                        workbook_path.display(),
                        self.backups_dir.display()
                    ))
                })?,
        };

        let safety_copy = if workbook_path.is_file() {
            let safety = self.unused_path(&stem(workbook_path)?, SAFETY_MARKER)?;
            fs::copy(workbook_path, &safety)
                .context("Unable to copy the workbook before restoring")?;
            debug!("Saved safety copy {}", safety.display());
            Some(safety)
        } else {
            None
        };

        let data = fs::read(&source)?;
        fs::write_atomic(workbook_path, &data)?;
        Ok(RestoreInfo {
            restored_from: source,
            safety_copy,
        })
    }

    /// Checks that `file` is a backup inside the backup directory. A bare file name is looked up
    /// in the backup directory.
    fn resolve(&self, file: &Path) -> Result<PathBuf> {
        let candidate = if file.components().count() == 1 {
            self.backups_dir.join(file)
        } else {
            file.to_path_buf()
        };
        let candidate = fs::canonicalize(&candidate)?;
        let dir = fs::canonicalize(&self.backups_dir)?;
        if candidate.parent() != Some(dir.as_path()) || !candidate.is_file() {
            return Err(error::validation(format!(
                "'{}' is not in the backup directory {}",
                file.display(),
                self.backups_dir.display()
            )));
        }
        Ok(candidate)
    }

    /// `<stem>-[marker-]<timestamp>.xlsx`, with a numeric suffix in the unlikely case that the
    /// name is taken.
    fn unused_path(&self, stem: &str, marker: &str) -> Result<PathBuf> {
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        let base = if marker.is_empty() {
            format!("{stem}-{stamp}")
        } else {
            format!("{stem}-{marker}-{stamp}")
        };
        let mut path = self.backups_dir.join(format!("{base}.{EXTENSION}"));
        let mut n = 2;
        while path.exists() {
            path = self.backups_dir.join(format!("{base}-{n}.{EXTENSION}"));
            n += 1;
        }
        Ok(path)
    }

    /// Deletes the oldest backups of `stem`, keeping `backup_copies`.
    fn rotate(&self, stem: &str) -> Result<Vec<PathBuf>> {
        let mut files: Vec<(PathBuf, _)> = Vec::new();
        for path in fs::list_files(&self.backups_dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_backup_file(&name, stem) {
                let created = fs::created(&path)?;
                files.push((path, (created, name)));
            }
        }

        // newest first
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let mut pruned = Vec::new();
        for (path, _) in files.into_iter().skip(self.backup_copies as usize) {
            match fs::remove(&path) {
                Ok(()) => {
                    debug!("Removed old backup {}", path.display());
                    pruned.push(path);
                }
                Err(e) => warn!("Unable to remove old backup {}: {e:#}", path.display()),
            }
        }
        Ok(pruned)
    }
}

/// `PO_Backups` in the workbook's directory.
pub fn default_dir(workbook_path: &Path) -> PathBuf {
    fs::parent_dir(workbook_path).join(BACKUP_DIR_NAME)
}

pub fn clamp_copies(backup_copies: u32) -> u32 {
    backup_copies.clamp(MIN_COPIES, MAX_COPIES)
}

fn stem(workbook_path: &Path) -> Result<String> {
    workbook_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .with_context(|| format!("'{}' has no file name", workbook_path.display()))
}

/// Checks if `filename` is a rotating backup of the workbook named `stem`: the stem, a dash, a
/// `YYYYmmdd-HHMMSS-micros` timestamp with an optional `-N` suffix, and `.xlsx`.
fn is_backup_file(filename: &str, stem: &str) -> bool {
    let Some(rest) = filename
        .strip_prefix(stem)
        .and_then(|r| r.strip_prefix('-'))
        .and_then(|r| r.strip_suffix(&format!(".{EXTENSION}")))
    else {
        return false;
    };
    let parts: Vec<&str> = rest.split('-').collect();
    let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    match parts.as_slice() {
        [date, time, micros] => digits(date, 8) && digits(time, 6) && digits(micros, 6),
        [date, time, micros, n] => {
            digits(date, 8)
                && digits(time, 6)
                && digits(micros, 6)
                && !n.is_empty()
                && n.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorType};
    use tempfile::TempDir;

    fn workbook(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("IT POs.xlsx");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file("IT POs-20260219-101500-123456.xlsx", "IT POs"));
        assert!(is_backup_file("IT POs-20260219-101500-123456-2.xlsx", "IT POs"));
        assert!(!is_backup_file(
            "IT POs-restore-safety-20260219-101500-123456.xlsx",
            "IT POs"
        ));
        assert!(!is_backup_file("IT POs-2025-20260219-101500-123456.xlsx", "IT POs"));
        assert!(!is_backup_file("IT POs-20260219-101500-123456.xls", "IT POs"));
        assert!(!is_backup_file("Other-20260219-101500-123456.xlsx", "IT POs"));
    }

    #[test]
    fn test_copies_are_clamped() {
        assert_eq!(Backup::new("x", 0).backup_copies(), 1);
        assert_eq!(Backup::new("x", 3).backup_copies(), 3);
        assert_eq!(Backup::new("x", 100).backup_copies(), 25);
    }

    #[test]
    fn test_default_dir() {
        assert_eq!(
            default_dir(Path::new("/a/b/IT POs.xlsx")),
            PathBuf::from("/a/b/PO_Backups")
        );
    }

    #[test]
    fn test_create_and_rotate() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "v1");
        let backup = Backup::beside(&path, 3);

        let mut created = Vec::new();
        for _ in 0..5 {
            let info = backup.create(&path).unwrap();
            created.push(info.path);
        }

        let listed: Vec<PathBuf> = backup
            .list(&path)
            .unwrap()
            .into_iter()
            .map(|b| b.path)
            .collect();
        let expected: Vec<PathBuf> = created.iter().rev().take(3).cloned().collect();
        assert_eq!(listed, expected);
        assert_eq!(
            backup.latest(&path).unwrap().map(|b| b.path),
            created.last().cloned()
        );
    }

    #[test]
    fn test_create_reports_pruned() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "v1");
        let backup = Backup::beside(&path, 1);
        let first = backup.create(&path).unwrap();
        assert!(first.pruned.is_empty());
        let second = backup.create(&path).unwrap();
        assert_eq!(second.pruned, vec![first.path]);
    }

    #[test]
    fn test_create_missing_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.xlsx");
        let err = Backup::beside(&path, 1).create(&path).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::NotFound));
    }

    #[test]
    fn test_restore_latest_writes_safety_copy() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "good");
        let backup = Backup::beside(&path, 5);
        backup.create(&path).unwrap();
        std::fs::write(&path, "broken").unwrap();

        let info = backup.restore(&path, None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "good");
        let safety = info.safety_copy.unwrap();
        assert_eq!(std::fs::read_to_string(&safety).unwrap(), "broken");
        assert!(safety
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains(SAFETY_MARKER));

        // the safety copy is not a rotating backup
        assert_eq!(backup.list(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_by_file_name() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "good");
        let backup = Backup::beside(&path, 5);
        let info = backup.create(&path).unwrap();
        std::fs::write(&path, "changed").unwrap();
        let name = PathBuf::from(info.path.file_name().unwrap());
        backup.restore(&path, Some(&name)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "good");
    }

    #[test]
    fn test_restore_refuses_outside_file() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "current");
        let backup = Backup::beside(&path, 5);
        backup.create(&path).unwrap();
        let outside = dir.path().join("elsewhere.xlsx");
        std::fs::write(&outside, "evil").unwrap();

        let err = backup.restore(&path, Some(&outside)).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Validation));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "current");
    }

    #[test]
    fn test_restore_without_backups() {
        let dir = TempDir::new().unwrap();
        let path = workbook(&dir, "current");
        let err = Backup::beside(&path, 1).restore(&path, None).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::NotFound));
    }
}
