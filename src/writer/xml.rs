//! Structured markup output.
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <weather>
//!   <record>
//!     <outlook>sunny</outlook>
//!     <temperature/>
//!   </record>
//! </weather>
//! ```
//!
//! The relation name becomes the root element and each attribute a child
//! element of `<record>`; names are sanitized into valid XML names. Missing
//! renders as a self-closing element.

use super::{BlockEncoder, EncodedBlock, Payload, TargetFormat, TextWriter, WriterOptions};
use crate::batch::Batch;
use crate::schema::DocumentSchema;
use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Turn an arbitrary string into a valid XML element name.
///
/// Characters that are neither alphanumeric nor one of `_.-` become `_`;
/// names that would start with a digit (in any script), `-`, `.` or the
/// reserved `xml` prefix get a leading `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let needs_prefix = match out.chars().next() {
        None => true,
        Some(c) => c.is_numeric() || c == '-' || c == '.',
    } || out.to_ascii_lowercase().starts_with("xml");
    if needs_prefix {
        out.insert(0, '_');
    }
    out
}

pub struct XmlEncoder {
    schema: Arc<DocumentSchema>,
    record: String,
    elements: Vec<String>,
}

impl XmlEncoder {
    #[must_use]
    pub fn new(schema: Arc<DocumentSchema>, record_element: &str) -> Self {
        let elements = schema.names().map(sanitize_name).collect();
        Self {
            schema,
            record: sanitize_name(record_element),
            elements,
        }
    }
}

impl BlockEncoder for XmlEncoder {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock> {
        let attrs = self.schema.attributes();
        let mut w = Writer::new(Vec::with_capacity(batch.len() * 128));
        for row in &batch.rows {
            w.get_mut().extend_from_slice(b"  ");
            w.write_event(Event::Start(BytesStart::new(self.record.as_str())))?;
            w.get_mut().push(b'\n');
            for ((cell, attr), element) in row.iter().zip(attrs).zip(&self.elements) {
                w.get_mut().extend_from_slice(b"    ");
                if cell.is_missing() {
                    w.write_event(Event::Empty(BytesStart::new(element.as_str())))?;
                } else {
                    w.write_event(Event::Start(BytesStart::new(element.as_str())))?;
                    w.write_event(Event::Text(BytesText::new(&cell.render(attr))))?;
                    w.write_event(Event::End(BytesEnd::new(element.as_str())))?;
                }
                w.get_mut().push(b'\n');
            }
            w.get_mut().extend_from_slice(b"  ");
            w.write_event(Event::End(BytesEnd::new(self.record.as_str())))?;
            w.get_mut().push(b'\n');
        }
        Ok(EncodedBlock {
            seq: batch.seq,
            rows: batch.len(),
            payload: Payload::Bytes(w.into_inner()),
        })
    }
}

pub(super) fn open(
    schema: Arc<DocumentSchema>,
    file: File,
    dest: &Path,
    options: &WriterOptions,
) -> Result<TextWriter> {
    let root = sanitize_name(schema.relation());
    let mut head = Writer::new(Vec::new());
    head.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    head.get_mut().push(b'\n');
    head.write_event(Event::Start(BytesStart::new(root.as_str())))?;
    head.get_mut().push(b'\n');

    let mut tail = Writer::new(Vec::new());
    tail.write_event(Event::End(BytesEnd::new(root.as_str())))?;
    tail.get_mut().push(b'\n');

    let encoder = Arc::new(XmlEncoder::new(schema, &options.record_element));
    TextWriter::new(
        TargetFormat::Xml,
        file,
        dest,
        encoder,
        &head.into_inner(),
        b"",
        tail.into_inner(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::schema::AttributeKind;

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("petal width"), "petal_width");
        assert_eq!(sanitize_name("2nd"), "_2nd");
        assert_eq!(sanitize_name("xmlns"), "_xmlns");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name("a.b-c"), "a.b-c");
        assert_eq!(sanitize_name("٣rd"), "_٣rd");
        assert_eq!(sanitize_name("größe"), "größe");
    }

    #[test]
    fn missing_is_self_closing_and_text_is_escaped() {
        let schema = Arc::new(
            DocumentSchema::new("t")
                .with_attribute("a", AttributeKind::String)
                .unwrap()
                .with_attribute("b c", AttributeKind::Numeric)
                .unwrap(),
        );
        let enc = XmlEncoder::new(schema, "record");
        let block = enc
            .encode(&Batch::new(0, 0, vec![vec![Cell::Text("x<y&z".into()), Cell::Missing]]))
            .unwrap();
        let Payload::Bytes(bytes) = block.payload else {
            panic!("bytes expected");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "  <record>\n    <a>x&lt;y&amp;z</a>\n    <b_c/>\n  </record>\n"
        );
    }
}
