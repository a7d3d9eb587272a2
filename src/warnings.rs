//! Non-fatal conversion warnings.
//!
//! In fast mode, shape and domain problems that would abort a strict run are
//! repaired and recorded here instead. Warnings are collected per batch and
//! merged in sequence order, so the final list is deterministic regardless of
//! how parallel workers were scheduled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

/// What kind of repair a warning describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Dense row had fewer fields than attributes; padded with Missing.
    PaddedRow,
    /// Dense row had more fields than attributes; extra fields dropped.
    TruncatedRow,
    /// Sparse indices were out of order or repeated; row was sorted.
    UnsortedSparse,
    /// Nominal token outside the declared domain; kept as text.
    DomainViolation,
    /// Token could not be coerced; value replaced by Missing.
    TypeCoercion,
    /// Integer attribute received a fractional value; truncated.
    FractionTruncated,
}

/// A single recorded repair with its source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWarning {
    /// 1-based source line.
    pub line: usize,
    /// Attribute the warning concerns, when it concerns one.
    pub attribute: Option<String>,
    pub kind: WarningKind,
    pub message: String,
}

impl ConversionWarning {
    pub fn new(line: usize, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            line,
            attribute: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_attribute(
        line: usize,
        attribute: impl Into<String>,
        kind: WarningKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            attribute: Some(attribute.into()),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "line {} [{}]: {}", self.line, attr, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

/// Accumulates warnings for a whole job.
#[derive(Debug, Clone, Default)]
pub struct WarningCollector {
    warnings: Vec<ConversionWarning>,
}

impl WarningCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ConversionWarning) {
        tracing::warn!(line = warning.line, kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = ConversionWarning>) {
        for w in warnings {
            self.push(w);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    #[must_use]
    pub fn warnings(&self) -> &[ConversionWarning] {
        &self.warnings
    }

    /// Number of warnings of one kind.
    #[must_use]
    pub fn count_of(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<ConversionWarning> {
        self.warnings
    }

    /// Export warnings as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.warnings)
    }

    /// Write warnings to a file in JSON format.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for WarningCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WarningCollector({} warnings)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut c = WarningCollector::new();
        c.push(ConversionWarning::new(3, WarningKind::PaddedRow, "padded"));
        c.push(ConversionWarning::for_attribute(
            4,
            "b",
            WarningKind::DomainViolation,
            "`Z` not in domain",
        ));
        assert_eq!(c.len(), 2);
        assert_eq!(c.count_of(WarningKind::DomainViolation), 1);
        assert_eq!(c.warnings()[1].to_string(), "line 4 [b]: `Z` not in domain");
    }

    #[test]
    fn json_export_uses_snake_case_kinds() {
        let mut c = WarningCollector::new();
        c.push(ConversionWarning::new(9, WarningKind::UnsortedSparse, "sorted"));
        let json = c.to_json().unwrap();
        assert!(json.contains("\"unsorted_sparse\""));
    }
}
