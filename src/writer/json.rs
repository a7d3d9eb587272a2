//! Object-notation output: one JSON array of row objects, or JSON Lines.
//!
//! Keys follow attribute order. Integral numbers are written as integers,
//! nominal cells as their label, dates in the attribute's declared pattern,
//! Missing as `null`.

use super::{BlockEncoder, EncodedBlock, JsonLayout, Payload, TargetFormat, TextWriter};
use crate::batch::Batch;
use crate::cell::{Cell, Row};
use crate::schema::{AttributeSchema, DocumentSchema};
use anyhow::{Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

struct RowView<'a> {
    schema: &'a DocumentSchema,
    row: &'a Row,
}

struct CellView<'a> {
    attr: &'a AttributeSchema,
    cell: &'a Cell,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let attrs = self.schema.attributes();
        let mut map = serializer.serialize_map(Some(attrs.len()))?;
        for (attr, cell) in attrs.iter().zip(self.row) {
            map.serialize_entry(&attr.name, &CellView { attr, cell })?;
        }
        map.end()
    }
}

impl Serialize for CellView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.cell {
            Cell::Missing => serializer.serialize_none(),
            Cell::Integer(i) => serializer.serialize_i64(*i),
            Cell::Number(value) => serializer.serialize_f64(*value),
            Cell::Text(s) => serializer.serialize_str(s),
            _ => serializer.serialize_str(&self.cell.render(self.attr)),
        }
    }
}

pub struct JsonEncoder {
    schema: Arc<DocumentSchema>,
    layout: JsonLayout,
}

impl JsonEncoder {
    #[must_use]
    pub fn new(schema: Arc<DocumentSchema>, layout: JsonLayout) -> Self {
        Self { schema, layout }
    }
}

impl BlockEncoder for JsonEncoder {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock> {
        let mut buf = Vec::with_capacity(batch.len() * 64);
        for (i, row) in batch.rows.iter().enumerate() {
            match self.layout {
                // Array rows are "\n{...}" joined by ","; the writer puts ","
                // between blocks too, so block boundaries leave no trace.
                JsonLayout::Array => {
                    if i > 0 {
                        buf.push(b',');
                    }
                    buf.push(b'\n');
                }
                JsonLayout::Lines => {}
            }
            let view = RowView {
                schema: &self.schema,
                row,
            };
            serde_json::to_writer(&mut buf, &view)
                .with_context(|| format!("serialize row {} to JSON", batch.first_row + i as u64 + 1))?;
            if self.layout == JsonLayout::Lines {
                buf.push(b'\n');
            }
        }
        Ok(EncodedBlock {
            seq: batch.seq,
            rows: batch.len(),
            payload: Payload::Bytes(buf),
        })
    }
}

pub(super) fn open(
    schema: Arc<DocumentSchema>,
    layout: JsonLayout,
    file: File,
    dest: &Path,
) -> Result<TextWriter> {
    let encoder = Arc::new(JsonEncoder::new(schema, layout));
    let (prologue, separator, epilogue): (&[u8], &'static [u8], &[u8]) = match layout {
        JsonLayout::Array => (&b"["[..], &b","[..], &b"\n]\n"[..]),
        JsonLayout::Lines => (&b""[..], &b""[..], &b""[..]),
    };
    TextWriter::new(
        TargetFormat::Json(layout),
        file,
        dest,
        encoder,
        prologue,
        separator,
        epilogue.to_vec(),
    )
}
