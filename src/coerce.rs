//! Raw token → typed [`Cell`] conversion.
//!
//! Strict mode turns every shape, domain and type problem into an error.
//! Fast mode repairs what it can and reports a [`ConversionWarning`] instead;
//! a non-numeric token for a numeric attribute is fatal in both modes.

use crate::cell::{Cell, Row, exact_i64};
use crate::error::{ArffError, ArffResult};
use crate::parser::{Record, RecordValues, Token};
use crate::schema::{AttributeKind, AttributeSchema, DocumentSchema};
use crate::warnings::{ConversionWarning, WarningKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoercionPolicy {
    pub fast_mode: bool,
}

impl CoercionPolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self { fast_mode: false }
    }

    #[must_use]
    pub fn fast() -> Self {
        Self { fast_mode: true }
    }

    /// Coerce one token for `attr`. Repairs made in fast mode are appended
    /// to `warnings`.
    pub fn coerce_token(
        &self,
        attr: &AttributeSchema,
        token: &Token,
        line: usize,
        warnings: &mut Vec<ConversionWarning>,
    ) -> ArffResult<Cell> {
        if token.is_missing() {
            return Ok(Cell::Missing);
        }
        let text = token.text.as_str();
        match &attr.kind {
            AttributeKind::Numeric => parse_number(attr, text, line),
            AttributeKind::Integer => {
                let value = match parse_number(attr, text, line)? {
                    Cell::Number(value) => value,
                    exact => return Ok(exact),
                };
                if let Some(i) = exact_i64(value) {
                    return Ok(Cell::Integer(i));
                }
                // A value outside i64 has nothing to truncate to, even in fast mode.
                let truncated = exact_i64(value.trunc());
                let Some(i) = truncated.filter(|_| self.fast_mode) else {
                    return Err(ArffError::type_mismatch(line, &attr.name, text, "integer"));
                };
                warnings.push(ConversionWarning::for_attribute(
                    line,
                    &attr.name,
                    WarningKind::FractionTruncated,
                    format!("`{text}` truncated to an integer"),
                ));
                Ok(Cell::Integer(i))
            }
            AttributeKind::String => Ok(Cell::Text(token.text.clone())),
            AttributeKind::Nominal(domain) => match domain.index_of(text) {
                Some(i) => Ok(Cell::Nominal(i)),
                None if self.fast_mode => {
                    warnings.push(ConversionWarning::for_attribute(
                        line,
                        &attr.name,
                        WarningKind::DomainViolation,
                        format!("`{text}` is not a declared value; kept as text"),
                    ));
                    Ok(Cell::Text(token.text.clone()))
                }
                None => Err(ArffError::domain(line, &attr.name, text)),
            },
            AttributeKind::Date(format) => match format.parse(text) {
                Some(ts) => Ok(Cell::Date(ts)),
                None if self.fast_mode => {
                    warnings.push(ConversionWarning::for_attribute(
                        line,
                        &attr.name,
                        WarningKind::TypeCoercion,
                        format!("`{text}` does not match date pattern `{}`", format.pattern()),
                    ));
                    Ok(Cell::Missing)
                }
                None => Err(ArffError::type_mismatch(
                    line,
                    &attr.name,
                    text,
                    format!("date `{}`", format.pattern()),
                )),
            },
        }
    }

    /// Coerce a whole record into a row aligned with `schema`. Sparse
    /// records are expanded; attributes they omit are Missing.
    pub fn coerce_record(
        &self,
        schema: &DocumentSchema,
        record: Record,
    ) -> ArffResult<(Row, Vec<ConversionWarning>)> {
        let Record {
            line,
            values,
            mut warnings,
        } = record;
        let attrs = schema.attributes();
        let row = match values {
            RecordValues::Dense(tokens) => attrs
                .iter()
                .zip(tokens.iter())
                .map(|(attr, token)| self.coerce_token(attr, token, line, &mut warnings))
                .collect::<ArffResult<Row>>()?,
            RecordValues::Sparse(pairs) => {
                let mut row: Row = vec![Cell::Missing; attrs.len()];
                for (index, token) in &pairs {
                    let attr = attrs.get(*index).ok_or_else(|| {
                        ArffError::parse(line, index.to_string(), "sparse index out of range")
                    })?;
                    row[*index] = self.coerce_token(attr, token, line, &mut warnings)?;
                }
                row
            }
        };
        Ok((row, warnings))
    }
}

fn parse_number(attr: &AttributeSchema, text: &str, line: usize) -> ArffResult<Cell> {
    if !text.contains(['.', 'e', 'E'])
        && let Ok(i) = text.parse::<i64>()
    {
        return Ok(Cell::Integer(i));
    }
    let value: f64 = text
        .parse()
        .map_err(|_| ArffError::type_mismatch(line, &attr.name, text, attr.kind.name()))?;
    Ok(Cell::Number(value))
}
