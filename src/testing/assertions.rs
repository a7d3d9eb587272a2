//! Assertions over conversion outcomes and written artifacts.

use crate::error::{ArffError, ErrorKind};
use crate::job::ConversionResult;
use crate::warnings::WarningKind;
use std::fs;
use std::path::Path;

/// Assert that a failed job carries a typed [`ArffError`] of `kind`, and
/// return it for further checks.
///
/// # Panics
///
/// Panics if the error chain holds no [`ArffError`] or it is of another kind.
///
/// ```
/// use arffbeam::error::{ArffError, ErrorKind};
/// use arffbeam::testing::assert_arff_error;
///
/// let err: anyhow::Error = ArffError::domain(7, "b", "Z").into();
/// let typed = assert_arff_error(&err, ErrorKind::Domain);
/// assert_eq!(typed.line(), Some(7));
/// ```
#[track_caller]
pub fn assert_arff_error(err: &anyhow::Error, kind: ErrorKind) -> &ArffError {
    let typed = err
        .chain()
        .find_map(|e| e.downcast_ref::<ArffError>())
        .unwrap_or_else(|| panic!("expected a {kind} error, got untyped error: {err:#}"));
    assert_eq!(typed.kind(), kind, "unexpected error: {typed}");
    typed
}

/// Assert the warning kinds of a result, in order.
#[track_caller]
pub fn assert_warning_kinds(result: &ConversionResult, expected: &[WarningKind]) {
    let actual: Vec<WarningKind> = result.warnings.iter().map(|w| w.kind).collect();
    assert_eq!(
        actual, expected,
        "warning mismatch:\n  Expected: {expected:?}\n  Actual: {:#?}",
        result.warnings
    );
}

/// Assert two artifacts are byte-for-byte identical.
///
/// # Panics
///
/// Panics if either file cannot be read or the contents differ. For text
/// files the first differing line is reported.
#[track_caller]
pub fn assert_same_bytes(a: impl AsRef<Path>, b: impl AsRef<Path>) {
    let (a, b) = (a.as_ref(), b.as_ref());
    let left = fs::read(a).unwrap_or_else(|e| panic!("read {}: {e}", a.display()));
    let right = fs::read(b).unwrap_or_else(|e| panic!("read {}: {e}", b.display()));
    if left == right {
        return;
    }
    if let (Ok(l), Ok(r)) = (std::str::from_utf8(&left), std::str::from_utf8(&right)) {
        let at = l.lines().zip(r.lines()).position(|(x, y)| x != y);
        panic!(
            "{} and {} differ (first differing line: {at:?}, {} vs {} lines)",
            a.display(),
            b.display(),
            l.lines().count(),
            r.lines().count()
        );
    }
    panic!(
        "{} and {} differ ({} vs {} bytes)",
        a.display(),
        b.display(),
        left.len(),
        right.len()
    );
}

/// Assert a text artifact has exactly these lines.
#[track_caller]
pub fn assert_lines(path: impl AsRef<Path>, expected: &[&str]) {
    let path = path.as_ref();
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    let actual: Vec<&str> = text.lines().collect();
    assert_eq!(actual, expected, "contents of {}", path.display());
}
