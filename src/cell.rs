//! Typed cell values and rows.

use crate::schema::{AttributeKind, AttributeSchema};
use chrono::NaiveDateTime;
use std::borrow::Cow;

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric value read from a token with a fraction or an exponent.
    Number(f64),
    /// A numeric token with no fractional part and no exponent that fits an
    /// `i64`. Kept exact so writers can encode it as an integer.
    Integer(i64),
    Text(String),
    /// Index into the attribute's nominal domain.
    Nominal(usize),
    Date(NaiveDateTime),
    Missing,
}

impl Cell {
    #[must_use]
    pub fn number(value: f64) -> Self {
        Cell::Number(value)
    }

    #[must_use]
    pub fn integer(value: i64) -> Self {
        Cell::Integer(value)
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integer view of a number with no fractional part that fits an `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(i) => Some(*i),
            Cell::Number(value) => exact_i64(*value),
            _ => None,
        }
    }

    /// Render the cell as text for `attr`. Missing renders as the empty string.
    #[must_use]
    pub fn render<'a>(&'a self, attr: &'a AttributeSchema) -> Cow<'a, str> {
        match self {
            Cell::Number(value) => Cow::Owned(value.to_string()),
            Cell::Integer(i) => Cow::Owned(i.to_string()),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Nominal(i) => match attr.domain().and_then(|d| d.label(*i)) {
                Some(label) => Cow::Borrowed(label),
                None => Cow::Owned(i.to_string()),
            },
            Cell::Date(ts) => match &attr.kind {
                AttributeKind::Date(f) => Cow::Owned(f.format(ts)),
                _ => Cow::Owned(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            },
            Cell::Missing => Cow::Borrowed(""),
        }
    }
}

/// `value` as an `i64` when it has no fractional part and is in range.
pub(crate) fn exact_i64(value: f64) -> Option<i64> {
    // i64::MIN is exact in f64; i64::MAX rounds up to 2^63, which is excluded.
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

/// One row, aligned 1:1 with the document schema.
pub type Row = Vec<Cell>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Domain;

    fn attr(kind: AttributeKind) -> AttributeSchema {
        AttributeSchema {
            name: "a".into(),
            kind,
            source_ordinal: 0,
        }
    }

    #[test]
    fn numbers_render_canonically() {
        let a = attr(AttributeKind::Numeric);
        assert_eq!(Cell::number(1.5).render(&a), "1.5");
        assert_eq!(Cell::number(2.0).render(&a), "2");
        assert_eq!(Cell::integer(-7).render(&a), "-7");
    }

    #[test]
    fn nominal_renders_label() {
        let a = attr(AttributeKind::Nominal(Domain::new(["X", "Y"]).unwrap()));
        assert_eq!(Cell::Nominal(1).render(&a), "Y");
        assert_eq!(Cell::Missing.render(&a), "");
    }

    #[test]
    fn as_i64_only_for_exact_values() {
        assert_eq!(Cell::number(3.0).as_i64(), Some(3));
        assert_eq!(Cell::number(3.5).as_i64(), None);
        assert_eq!(Cell::number(1e19).as_i64(), None);
        assert_eq!(Cell::number(f64::NAN).as_i64(), None);
        assert_eq!(Cell::Missing.as_i64(), None);
    }

    #[test]
    fn integers_beyond_f64_precision_stay_exact() {
        let big = 10_000_000_000_000_001_i64;
        let cell = Cell::integer(big);
        assert_eq!(cell.as_i64(), Some(big));
        assert_eq!(cell.render(&attr(AttributeKind::Integer)), "10000000000000001");
        assert_eq!(Cell::integer(i64::MAX).as_i64(), Some(i64::MAX));
        assert_eq!(Cell::number(1e16).as_i64(), Some(10_000_000_000_000_000));
    }
}
