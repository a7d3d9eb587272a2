//! Sequence-tagged groups of rows: the unit of I/O and of parallel work.

use crate::cell::Row;
use crate::coerce::CoercionPolicy;
use crate::error::ArffResult;
use crate::parser::Record;
use crate::schema::DocumentSchema;
use crate::warnings::ConversionWarning;

/// Tokenized records straight off the parser, not yet typed.
#[derive(Debug, Clone)]
pub struct RawBatch {
    /// Sequence index, starting at 0 with no gaps.
    pub seq: u64,
    /// 0-based index of the first row within the document.
    pub first_row: u64,
    pub records: Vec<Record>,
}

impl RawBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Type every record. Stops at the first fatal error, which is the
    /// earliest one in source order within this batch.
    pub fn coerce(self, schema: &DocumentSchema, policy: CoercionPolicy) -> ArffResult<Batch> {
        let mut rows = Vec::with_capacity(self.records.len());
        let mut warnings = Vec::new();
        for record in self.records {
            let (row, w) = policy.coerce_record(schema, record)?;
            rows.push(row);
            warnings.extend(w);
        }
        Ok(Batch {
            seq: self.seq,
            first_row: self.first_row,
            rows,
            warnings,
        })
    }
}

/// Typed rows ready for a writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub seq: u64,
    pub first_row: u64,
    pub rows: Vec<Row>,
    /// Fast-mode repairs made while parsing and coercing this batch.
    pub warnings: Vec<ConversionWarning>,
}

impl Batch {
    #[must_use]
    pub fn new(seq: u64, first_row: u64, rows: Vec<Row>) -> Self {
        Self {
            seq,
            first_row,
            rows,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
