//! Small synchronous filesystem helpers that attach the path to every error.
//!
//! Errors that indicate the file is locked or not writable are raised as `ErrorType::Access`
//! so that the user is told to close the workbook and retry.

use crate::error;
use anyhow::{Context, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Windows `ERROR_SHARING_VIOLATION`.
#[cfg(windows)]
const SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`.
#[cfg(windows)]
const LOCK_VIOLATION: i32 = 33;

/// Returns true if `e` means another process holds the file or we lack permission to it.
pub(crate) fn is_access_error(e: &std::io::Error) -> bool {
    if e.kind() == ErrorKind::PermissionDenied {
        return true;
    }
    // Excel holds an exclusive share lock on open workbooks
    #[cfg(windows)]
    {
        if matches!(e.raw_os_error(), Some(SHARING_VIOLATION | LOCK_VIOLATION)) {
            return true;
        }
    }
    false
}

/// Maps an I/O error on `path` into an `anyhow::Error`, classifying missing files and access
/// problems.
fn io_error(e: std::io::Error, action: &str, path: &Path) -> anyhow::Error {
    if is_access_error(&e) {
        error::access(format!("Unable to {action} '{}': {e}", path.display()))
    } else if e.kind() == ErrorKind::NotFound {
        error::not_found(format!("Unable to {action} '{}': {e}", path.display()))
    } else {
        anyhow::Error::new(e).context(format!("Unable to {action} '{}'", path.display()))
    }
}

pub(crate) fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)
        .with_context(|| format!("Unable to create directory {}", path.display()))
}

/// Reads a whole file into memory.
pub(crate) fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| io_error(e, "read", path))
}

pub(crate) fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| io_error(e, "read", path))
}

/// Writes `data` to `path` by writing a temporary file in the same directory and renaming it
/// into place, so that a failed write never leaves a truncated file behind. An existing file
/// keeps its permissions.
pub(crate) fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let existing = std::fs::metadata(path).ok().map(|meta| meta.permissions());
    // a rename would silently replace a read-only file
    if existing.as_ref().is_some_and(|perms| perms.readonly()) {
        return Err(error::access(format!(
            "Unable to write '{}': the file is read-only",
            path.display()
        )));
    }
    let dir = parent_dir(path);
    create_dir_all(dir)?;
    let prefix = format!(
        ".{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".tmp");
    // temp files are owner-only; a new file gets the usual mode, minus the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder
        .tempfile_in(dir)
        .map_err(|e| io_error(e, "create a temporary file in", dir))?;
    if let Some(perms) = existing {
        tmp.as_file()
            .set_permissions(perms)
            .map_err(|e| io_error(e, "set permissions of", tmp.path()))?;
    }
    tmp.write_all(data)
        .map_err(|e| io_error(e, "write", tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error(e, "flush", tmp.path()))?;
    tmp.persist(path).map_err(|e| io_error(e.error, "write", path))?;
    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Writes a plain text file, replacing it if it exists.
pub(crate) fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, contents).map_err(|e| io_error(e, "write", path))
}

/// Copies `from` to `to`.
pub(crate) fn copy(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    std::fs::copy(from, to).map_err(|e| io_error(e, "copy", from))?;
    debug!("Copied {} to {}", from.display(), to.display());
    Ok(())
}

pub(crate) fn remove(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::remove_file(path).map_err(|e| io_error(e, "remove", path))
}

/// Lists the files (not directories) directly inside `dir`. A missing directory has no files.
pub(crate) fn list_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_error(e, "read directory", dir))? {
        let entry = entry.context("Failed to read directory entry")?;
        if entry.path().is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// The creation time of the file, or its modification time where creation time is unavailable.
pub(crate) fn created(path: impl AsRef<Path>) -> Result<SystemTime> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).map_err(|e| io_error(e, "stat", path))?;
    meta.created()
        .or_else(|_| meta.modified())
        .with_context(|| format!("No timestamps are available for {}", path.display()))
}

pub(crate) fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::canonicalize(path).map_err(|e| io_error(e, "canonicalize", path))
}

/// `Path::parent` returns `Some("")` for bare file names; treat that as the current directory.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorType};
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(read(&path).unwrap(), b"second");
        // no temp files are left behind
        assert_eq!(list_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_write_atomic_read_only_is_access() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        write_atomic(&path, b"first").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let err = write_atomic(&path, b"second").unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Access));
        assert_eq!(read(&path).unwrap(), b"first");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        for mode in [0o644, 0o664] {
            std::fs::write(&path, b"first").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
            write_atomic(&path, b"second").unwrap();
            let meta = std::fs::metadata(&path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, mode);
            assert_eq!(read(&path).unwrap(), b"second");
        }
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = read(dir.path().join("nope.xlsx")).unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::NotFound));
    }

    #[test]
    fn test_list_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_parent_dir_of_bare_name() {
        assert_eq!(parent_dir(Path::new("foo.xlsx")), Path::new("."));
        assert_eq!(parent_dir(Path::new("a/foo.xlsx")), Path::new("a"));
    }

    #[test]
    fn test_is_access_error() {
        let denied = std::io::Error::from(ErrorKind::PermissionDenied);
        assert!(is_access_error(&denied));
        let missing = std::io::Error::from(ErrorKind::NotFound);
        assert!(!is_access_error(&missing));
    }
}
