//! Typed error taxonomy for ARFF parsing and conversion.
//!
//! The parser and the coercion layer raise [`ArffError`] values. Writers and
//! the orchestrator work with `anyhow::Result` so I/O failures carry path
//! context; the typed cause of a failed job is recovered with
//! `err.downcast_ref::<ArffError>()`.
//!
//! ```
//! use arffbeam::error::{ArffError, ErrorKind};
//!
//! let err = ArffError::domain(7, "b", "Z");
//! assert_eq!(err.kind(), ErrorKind::Domain);
//! assert_eq!(err.line(), Some(7));
//! ```

use std::fmt;

/// Broad category of an [`ArffError`], used to decide fatal vs. warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Schema,
    Type,
    Domain,
    Io,
    Cancelled,
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Schema => "schema",
            ErrorKind::Type => "type",
            ErrorKind::Domain => "domain",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Errors raised while reading and coercing an ARFF document.
#[derive(Debug, thiserror::Error)]
pub enum ArffError {
    /// Malformed header or data grammar.
    #[error("parse error at line {line}: {message} (token `{token}`)")]
    Parse {
        line: usize,
        token: String,
        message: String,
    },

    /// Invalid attribute declarations (duplicates, empty header).
    #[error("schema error at line {line}: {message}")]
    Schema { line: usize, message: String },

    /// A token that cannot be coerced to the attribute's declared kind.
    #[error("type error at line {line}: cannot read `{token}` as {expected} for attribute `{attribute}`")]
    Type {
        line: usize,
        attribute: String,
        token: String,
        expected: String,
    },

    /// A nominal value outside the attribute's declared domain.
    #[error("domain error at line {line}: `{token}` is not a declared value of nominal attribute `{attribute}`")]
    Domain {
        line: usize,
        attribute: String,
        token: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conversion cancelled")]
    Cancelled,

    #[error("unsupported target format `{0}`")]
    UnsupportedFormat(String),
}

impl ArffError {
    pub fn parse(line: usize, token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn schema(line: usize, message: impl Into<String>) -> Self {
        Self::Schema {
            line,
            message: message.into(),
        }
    }

    pub fn type_mismatch(
        line: usize,
        attribute: impl Into<String>,
        token: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::Type {
            line,
            attribute: attribute.into(),
            token: token.into(),
            expected: expected.into(),
        }
    }

    pub fn domain(line: usize, attribute: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Domain {
            line,
            attribute: attribute.into(),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArffError::Parse { .. } => ErrorKind::Parse,
            ArffError::Schema { .. } => ErrorKind::Schema,
            ArffError::Type { .. } => ErrorKind::Type,
            ArffError::Domain { .. } => ErrorKind::Domain,
            ArffError::Io(_) => ErrorKind::Io,
            ArffError::Cancelled => ErrorKind::Cancelled,
            ArffError::UnsupportedFormat(_) => ErrorKind::Unsupported,
        }
    }

    /// 1-based source line the error refers to, when there is one.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            ArffError::Parse { line, .. }
            | ArffError::Schema { line, .. }
            | ArffError::Type { line, .. }
            | ArffError::Domain { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub type ArffResult<T> = std::result::Result<T, ArffError>;
