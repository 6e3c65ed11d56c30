//! Centralized error handling for eruo.
//!
//! Most library functions return [`anyhow::Result`] and attach context with
//! `.context(...)`. The workbook, file format and database layers return
//! [`EruoError`] instead, so callers can branch on the failure category:
//!
//! ```
//! use eruo::error::EruoError;
//! use eruo::io::FileFormat;
//! use std::path::Path;
//!
//! let err = FileFormat::from_path(Path::new("notes.txt")).unwrap_err();
//! assert!(matches!(err, EruoError::Unsupported(_)));
//! assert_eq!(err.to_string(), "Unsupported file format: txt");
//! ```
//!
//! The [`ResultExt`] trait adds `.context()` to any result whose error converts
//! into [`EruoError`]:
//!
//! ```no_run
//! use eruo::error::ResultExt as _;
//!
//! fn load() -> eruo::error::Result<String> {
//!     std::fs::read_to_string("data.csv").context("Failed to load dataset")
//! }
//! ```

use std::fmt;

/// Main error type for eruo operations.
#[derive(Debug)]
pub enum EruoError {
    /// I/O errors (file operations, archives, etc.)
    Io(std::io::Error),

    /// Data processing errors (Polars, JSON manifests, etc.)
    DataProcessing(String),

    /// Database operation errors
    Database(String),

    /// Not a readable workbook, or a malformed connection url
    InvalidPath(String),

    /// Requested feature or format is not supported, e.g. `file format: txt`
    Unsupported(String),

    /// Error with context added by [`ResultExt`]
    Other(String),
}

impl fmt::Display for EruoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Database(msg) => write!(f, "Database error: {msg}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::Unsupported(msg) => write!(f, "Unsupported {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EruoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EruoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for EruoError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataProcessing(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for EruoError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<sqlx::Error> for EruoError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<zip::result::ZipError> for EruoError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::InvalidPath(format!("workbook archive: {err}"))
    }
}

/// Result type alias for eruo operations.
pub type Result<T> = std::result::Result<T, EruoError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EruoError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: EruoError = e.into();
            EruoError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: EruoError = e.into();
            EruoError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EruoError::DataProcessing("column not found".to_owned());
        assert_eq!(err.to_string(), "Data processing error: column not found");
    }

    #[test]
    fn test_source_errors_convert() {
        let err: EruoError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(matches!(err, EruoError::DataProcessing(_)));
        assert!(err.to_string().starts_with("Data processing error: JSON error"));

        let err: EruoError = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(err, EruoError::InvalidPath(_)));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read file");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read file")
        );
    }
}
