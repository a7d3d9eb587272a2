//! Spreadsheet grid output (Office Open XML workbook, one sheet).
//!
//! This writer cannot stream. A worksheet declares its used range in a
//! `<dimension>` element ahead of the cell data, and the workbook is a zip
//! archive whose parts are written whole, so every encoded row is held in
//! memory until [`close`](super::FormatWriter::close). Large inputs with this
//! target keep the full row set resident.
//!
//! Encoding still happens per batch (rows are rendered to `<row>` XML by the
//! [`XlsxEncoder`], possibly on parallel workers); only insertion into the
//! in-memory grid is serialized.
//!
//! Numbers are stored as numeric cells, everything else as inline strings
//! (dates in the attribute's declared pattern). Missing cells are omitted.

use super::{ArtifactInfo, BlockEncoder, EncodedBlock, FormatWriter, Payload, SeqGate, TargetFormat, WriterOptions};
use crate::batch::Batch;
use crate::cell::Cell;
use crate::schema::DocumentSchema;
use anyhow::{Context, Result, bail};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Rows per worksheet, header included.
pub const MAX_ROWS: u64 = 1_048_576;
/// Columns per worksheet.
pub const MAX_COLUMNS: usize = 16_384;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Spreadsheet column name for a 0-based index (`0` → `A`, `26` → `AA`).
#[must_use]
pub fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// XML 1.0 forbids most control characters even when escaped.
fn strip_control(s: &str) -> std::borrow::Cow<'_, str> {
    if s.chars().any(|c| c < ' ' && !matches!(c, '\t' | '\n' | '\r')) {
        s.chars()
            .filter(|&c| c >= ' ' || matches!(c, '\t' | '\n' | '\r'))
            .collect::<String>()
            .into()
    } else {
        s.into()
    }
}

fn push_text_cell(out: &mut String, col: &str, row: u64, text: &str) {
    let text = strip_control(text);
    let preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    let _ = write!(out, r#"<c r="{col}{row}" t="inlineStr"><is>"#);
    if preserve {
        out.push_str(r#"<t xml:space="preserve">"#);
    } else {
        out.push_str("<t>");
    }
    out.push_str(&escape(&*text));
    out.push_str("</t></is></c>");
}

pub struct XlsxEncoder {
    schema: Arc<DocumentSchema>,
    columns: Vec<String>,
}

impl XlsxEncoder {
    #[must_use]
    pub fn new(schema: Arc<DocumentSchema>) -> Self {
        let columns = (0..schema.len()).map(column_name).collect();
        Self { schema, columns }
    }

    fn header_row(&self) -> String {
        let mut out = String::from(r#"<row r="1">"#);
        for (name, col) in self.schema.names().zip(&self.columns) {
            push_text_cell(&mut out, col, 1, name);
        }
        out.push_str("</row>");
        out
    }
}

impl BlockEncoder for XlsxEncoder {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock> {
        let attrs = self.schema.attributes();
        let mut out = String::with_capacity(batch.len() * 64 * attrs.len().max(1));
        for (i, row) in batch.rows.iter().enumerate() {
            // Row 1 is the header.
            let r = batch.first_row + i as u64 + 2;
            if r > MAX_ROWS {
                bail!("row {r} exceeds the worksheet limit of {MAX_ROWS} rows");
            }
            let _ = write!(out, r#"<row r="{r}">"#);
            for ((cell, attr), col) in row.iter().zip(attrs).zip(&self.columns) {
                match cell {
                    Cell::Missing => {}
                    Cell::Number(value) if value.is_finite() => {
                        let _ = write!(out, r#"<c r="{col}{r}"><v>{value}</v></c>"#);
                    }
                    Cell::Integer(i) => {
                        let _ = write!(out, r#"<c r="{col}{r}"><v>{i}</v></c>"#);
                    }
                    _ => push_text_cell(&mut out, col, r, &cell.render(attr)),
                }
            }
            out.push_str("</row>");
        }
        Ok(EncodedBlock {
            seq: batch.seq,
            rows: batch.len(),
            payload: Payload::Bytes(out.into_bytes()),
        })
    }
}

/// Buffers encoded rows and writes the workbook at close.
pub struct XlsxWriter {
    file: File,
    sheet_name: String,
    encoder: Arc<XlsxEncoder>,
    rows: Vec<Vec<u8>>,
    gate: SeqGate,
}

impl XlsxWriter {
    pub fn open(schema: Arc<DocumentSchema>, file: File, options: &WriterOptions) -> Result<Self> {
        if schema.len() > MAX_COLUMNS {
            bail!("{} attributes exceed the worksheet limit of {MAX_COLUMNS} columns", schema.len());
        }
        Ok(Self {
            file,
            sheet_name: options.sheet_name.clone(),
            encoder: Arc::new(XlsxEncoder::new(schema)),
            rows: Vec::new(),
            gate: SeqGate::default(),
        })
    }

    fn worksheet(&self, total_rows: u64) -> String {
        let last_col = self
            .encoder
            .columns
            .last()
            .cloned()
            .unwrap_or_else(|| "A".to_string());
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        let _ = write!(xml, r#"<dimension ref="A1:{last_col}{}"/><sheetData>"#, total_rows + 1);
        xml.push_str(&self.encoder.header_row());
        xml
    }
}

impl FormatWriter for XlsxWriter {
    fn format(&self) -> TargetFormat {
        TargetFormat::Xlsx
    }

    fn encoder(&self) -> Arc<dyn BlockEncoder> {
        self.encoder.clone()
    }

    fn write_block(&mut self, block: EncodedBlock) -> Result<()> {
        self.gate.admit(&block)?;
        let Payload::Bytes(bytes) = block.payload else {
            bail!("xlsx writer received a columnar block");
        };
        self.rows.push(bytes);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<ArtifactInfo> {
        let info = self.gate.info();
        tracing::debug!(rows = info.rows, blocks = info.blocks, "writing buffered worksheet");
        let head = self.worksheet(info.rows);
        let workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            escape(self.sheet_name.as_str())
        );

        let XlsxWriter { file, rows, .. } = *self;
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(file);
        let parts: [(&str, &[u8]); 4] = [
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", ROOT_RELS.as_bytes()),
            ("xl/workbook.xml", workbook.as_bytes()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ];
        for (name, body) in parts {
            zip.start_file(name, options)
                .with_context(|| format!("start xlsx part {name}"))?;
            zip.write_all(body)?;
        }
        zip.start_file("xl/worksheets/sheet1.xml", options)
            .context("start xlsx worksheet")?;
        zip.write_all(head.as_bytes())?;
        for chunk in &rows {
            zip.write_all(chunk)?;
        }
        zip.write_all(b"</sheetData></worksheet>")?;
        zip.finish().context("finish xlsx archive")?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeKind;

    #[test]
    fn column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn rows_are_offset_past_the_header() {
        let schema = Arc::new(
            DocumentSchema::new("t")
                .with_attribute("a", AttributeKind::Numeric)
                .unwrap()
                .with_attribute("b", AttributeKind::String)
                .unwrap(),
        );
        let enc = XlsxEncoder::new(schema);
        let batch = Batch::new(3, 10, vec![vec![Cell::integer(4), Cell::Text(" x ".into())], vec![Cell::Missing, Cell::Missing]]);
        let Payload::Bytes(bytes) = enc.encode(&batch).unwrap().payload else {
            panic!("bytes expected");
        };
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"<row r="12"><c r="A12"><v>4</v></c><c r="B12" t="inlineStr"><is><t xml:space="preserve"> x </t></is></c></row><row r="13"></row>"#
        );
    }
}
