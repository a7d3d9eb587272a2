//! Delimited text output.
//!
//! Fields are quoted only when they contain the delimiter, a quote or a line
//! break (`csv`'s `QuoteStyle::Necessary`). Missing renders as an empty field.

use super::{BlockEncoder, EncodedBlock, Payload, TargetFormat, TextWriter, WriterOptions};
use crate::batch::Batch;
use crate::schema::DocumentSchema;
use anyhow::{Context, Result};
use csv::{QuoteStyle, Writer, WriterBuilder};
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub struct CsvEncoder {
    schema: Arc<DocumentSchema>,
    delimiter: u8,
}

impl CsvEncoder {
    #[must_use]
    pub fn new(schema: Arc<DocumentSchema>, delimiter: u8) -> Self {
        Self { schema, delimiter }
    }

    fn builder(&self) -> WriterBuilder {
        let mut b = WriterBuilder::new();
        b.delimiter(self.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .has_headers(false);
        b
    }

    /// Append one record. `csv` quotes a record made of a single empty
    /// field, so that case is written as a bare line break instead.
    fn write_fields<S: AsRef<str>>(&self, wtr: &mut Writer<Vec<u8>>, fields: &[S]) -> Result<()> {
        if let [only] = fields
            && only.as_ref().is_empty()
        {
            let full = std::mem::replace(wtr, self.builder().buffer_capacity(0).from_writer(Vec::new()));
            let mut buf = full.into_inner().context("flush CSV buffer")?;
            buf.push(b'\n');
            *wtr = self.builder().from_writer(buf);
            return Ok(());
        }
        wtr.write_record(fields.iter().map(|f| f.as_ref().as_bytes()))?;
        Ok(())
    }

    /// The header line (attribute names).
    pub fn header(&self) -> Result<Vec<u8>> {
        let names: Vec<&str> = self.schema.names().collect();
        let mut wtr = self.builder().from_writer(Vec::new());
        self.write_fields(&mut wtr, &names)
            .context("write CSV header")?;
        wtr.into_inner().context("flush CSV header")
    }
}

impl BlockEncoder for CsvEncoder {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock> {
        let attrs = self.schema.attributes();
        let capacity = batch.len().saturating_mul(16 * attrs.len().max(1));
        let mut wtr = self.builder().from_writer(Vec::with_capacity(capacity));
        let mut fields: Vec<Cow<'_, str>> = Vec::with_capacity(attrs.len());
        for (i, row) in batch.rows.iter().enumerate() {
            fields.clear();
            fields.extend(row.iter().zip(attrs).map(|(cell, attr)| cell.render(attr)));
            self.write_fields(&mut wtr, &fields)
                .with_context(|| format!("write CSV row {}", batch.first_row + i as u64 + 1))?;
        }
        let buf = wtr.into_inner().context("flush CSV block")?;
        Ok(EncodedBlock {
            seq: batch.seq,
            rows: batch.len(),
            payload: Payload::Bytes(buf),
        })
    }
}

pub(super) fn open(
    schema: Arc<DocumentSchema>,
    delimiter: u8,
    file: File,
    dest: &Path,
    options: &WriterOptions,
) -> Result<TextWriter> {
    let encoder = CsvEncoder::new(schema, delimiter);
    let header = if options.csv_header {
        encoder.header()?
    } else {
        Vec::new()
    };
    TextWriter::new(
        TargetFormat::Csv { delimiter },
        file,
        dest,
        Arc::new(encoder),
        &header,
        b"",
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::schema::{AttributeKind, Domain};

    fn schema() -> Arc<DocumentSchema> {
        Arc::new(
            DocumentSchema::new("t")
                .with_attribute("a", AttributeKind::Numeric)
                .unwrap()
                .with_attribute("b", AttributeKind::Nominal(Domain::new(["X", "Y"]).unwrap()))
                .unwrap()
                .with_attribute("c", AttributeKind::String)
                .unwrap(),
        )
    }

    #[test]
    fn quotes_only_when_needed() {
        let enc = CsvEncoder::new(schema(), b',');
        let batch = Batch::new(
            0,
            0,
            vec![
                vec![Cell::number(1.5), Cell::Nominal(0), Cell::Text("plain".into())],
                vec![Cell::Missing, Cell::Nominal(1), Cell::Text("a,b \"q\"".into())],
            ],
        );
        let Payload::Bytes(bytes) = enc.encode(&batch).unwrap().payload else {
            panic!("bytes expected");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "1.5,X,plain\n,Y,\"a,b \"\"q\"\"\"\n");
        assert_eq!(enc.header().unwrap(), b"a,b,c\n");
    }

    #[test]
    fn single_column_missing_is_an_empty_line() {
        let schema = Arc::new(
            DocumentSchema::new("t")
                .with_attribute("a", AttributeKind::Numeric)
                .unwrap(),
        );
        let enc = CsvEncoder::new(schema, b',');
        let batch = Batch::new(
            0,
            0,
            vec![vec![Cell::integer(1)], vec![Cell::Missing], vec![Cell::Text("x,y".into())], vec![Cell::Missing]],
        );
        let Payload::Bytes(bytes) = enc.encode(&batch).unwrap().payload else {
            panic!("bytes expected");
        };
        assert_eq!(String::from_utf8(bytes).unwrap(), "1\n\n\"x,y\"\n\n");
        assert_eq!(enc.header().unwrap(), b"a\n");
    }
}
