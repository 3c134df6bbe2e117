//! Error types surfaced by the command layer.
//!
//! Internally the crate uses `anyhow` and adds context as errors bubble up. A handful of
//! failures need to be distinguishable by the user (a locked workbook, a missing field), so
//! those are created as an `Error` with an `ErrorType` and placed into the `anyhow` chain. When a
//! command finishes, `IntoResult::pub_result` turns the `anyhow::Error` into the public `Error`,
//! keeping the most specific `ErrorType` found in the chain.

use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};

/// The message appended to every `ErrorType::Access` error.
pub(crate) const CLOSE_AND_RETRY: &str =
    "Close the workbook in any other program (e.g. Excel) and try again.";

/// The kind of failure, used to decide what the user is told.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The workbook (or a backup) is locked by another process or cannot be written.
    Access,
    /// A required field is missing or user input is malformed.
    Validation,
    /// The workbook or backup does not exist.
    NotFound,
    /// The configuration could not be created or loaded.
    Config,
    /// The workbook could not be read, parsed or written.
    Workbook,
    /// A backup could not be created, listed or restored.
    Backup,
}

serde_plain::derive_display_from_serialize!(ErrorType);

/// The public error type.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// What kind of failure this is.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Creates an `anyhow::Error` that is recognized as `ErrorType::Validation`.
pub(crate) fn validation(message: impl Display) -> anyhow::Error {
    Error::new(ErrorType::Validation, anyhow::anyhow!("{message}")).into()
}

/// Creates an `anyhow::Error` that is recognized as `ErrorType::Access`.
pub(crate) fn access(message: impl Display) -> anyhow::Error {
    Error::new(
        ErrorType::Access,
        anyhow::anyhow!("{message}. {CLOSE_AND_RETRY}"),
    )
    .into()
}

/// Creates an `anyhow::Error` that is recognized as `ErrorType::NotFound`.
pub(crate) fn not_found(message: impl Display) -> anyhow::Error {
    Error::new(ErrorType::NotFound, anyhow::anyhow!("{message}")).into()
}

/// Finds the `ErrorType` of the first typed `Error` in the chain, if any.
pub(crate) fn classify(e: &anyhow::Error) -> Option<ErrorType> {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::error_type)
}

/// Converts an internal `anyhow::Result` into the public `Result`.
pub(crate) trait IntoResult<T> {
    /// Uses the `ErrorType` already present in the error chain, falling back to `error_type`.
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for anyhow::Result<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| {
            let error_type = classify(&e).unwrap_or(error_type);
            Error::new(error_type, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_through_context() {
        let result: anyhow::Result<()> = Err(validation("Vendor/Store is required"));
        let err = result.context("Unable to add the purchase order").unwrap_err();
        assert_eq!(classify(&err), Some(ErrorType::Validation));
    }

    #[test]
    fn test_pub_result_keeps_typed_kind() {
        let result: anyhow::Result<()> = Err(access("Unable to write /tmp/x.xlsx"));
        let err = result.pub_result(ErrorType::Workbook).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Access);
        assert!(err.to_string().contains(CLOSE_AND_RETRY));
    }

    #[test]
    fn test_pub_result_falls_back() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("boom"));
        let err = result.pub_result(ErrorType::Backup).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Backup);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::NotFound.to_string(), "not_found");
    }
}
