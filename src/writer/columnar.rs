//! Shared Arrow conversion for the Parquet and Arrow IPC writers.
//!
//! | ARFF kind        | Arrow type             |
//! |------------------|------------------------|
//! | numeric / real   | `Float64`              |
//! | integer          | `Int64`                |
//! | string / nominal | `Utf8`                 |
//! | date             | `Timestamp(ms)`        |
//!
//! What Arrow's types cannot say is carried in field metadata so a reader can
//! rebuild the ARFF schema: `arff.kind`, `arff.domain` (JSON array of labels)
//! and `arff.date_format`, plus `arff.relation` on the schema.

use super::{BlockEncoder, EncodedBlock, Payload};
use crate::batch::Batch;
use crate::cell::Cell;
use crate::schema::{AttributeKind, AttributeSchema, DocumentSchema};
use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

pub const META_KIND: &str = "arff.kind";
pub const META_DOMAIN: &str = "arff.domain";
pub const META_DATE_FORMAT: &str = "arff.date_format";
pub const META_RELATION: &str = "arff.relation";

fn data_type(kind: &AttributeKind) -> DataType {
    match kind {
        AttributeKind::Numeric => DataType::Float64,
        AttributeKind::Integer => DataType::Int64,
        AttributeKind::String | AttributeKind::Nominal(_) => DataType::Utf8,
        AttributeKind::Date(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

fn field(attr: &AttributeSchema) -> Result<Field> {
    let mut meta = HashMap::from([(META_KIND.to_string(), attr.kind.name().to_string())]);
    match &attr.kind {
        AttributeKind::Nominal(domain) => {
            let labels = serde_json::to_string(domain.labels())
                .with_context(|| format!("encode domain of `{}`", attr.name))?;
            meta.insert(META_DOMAIN.to_string(), labels);
        }
        AttributeKind::Date(format) => {
            meta.insert(META_DATE_FORMAT.to_string(), format.pattern().to_string());
        }
        _ => {}
    }
    Ok(Field::new(&attr.name, data_type(&attr.kind), true).with_metadata(meta))
}

/// Arrow schema for `schema`, with ARFF metadata attached.
pub fn arrow_schema(schema: &DocumentSchema) -> Result<SchemaRef> {
    let fields = schema
        .attributes()
        .iter()
        .map(field)
        .collect::<Result<Vec<_>>>()?;
    let meta = HashMap::from([(META_RELATION.to_string(), schema.relation().to_string())]);
    Ok(Arc::new(Schema::new_with_metadata(fields, meta)))
}

fn column(attr: &AttributeSchema, index: usize, batch: &Batch) -> ArrayRef {
    let cells = batch.rows.iter().map(|row| row.get(index).unwrap_or(&Cell::Missing));
    match &attr.kind {
        AttributeKind::Numeric => Arc::new(cells.map(Cell::as_f64).collect::<Float64Array>()),
        AttributeKind::Integer => Arc::new(cells.map(Cell::as_i64).collect::<Int64Array>()),
        AttributeKind::String | AttributeKind::Nominal(_) => Arc::new(
            cells
                .map(|c| match c {
                    Cell::Missing => None,
                    other => Some(other.render(attr).into_owned()),
                })
                .collect::<StringArray>(),
        ),
        AttributeKind::Date(_) => Arc::new(
            cells
                .map(|c| match c {
                    Cell::Date(ts) => Some(ts.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect::<TimestampMillisecondArray>(),
        ),
    }
}

/// Encodes batches as Arrow record batches.
pub struct ColumnarEncoder {
    schema: Arc<DocumentSchema>,
    arrow: SchemaRef,
}

impl ColumnarEncoder {
    pub fn new(schema: Arc<DocumentSchema>) -> Result<Self> {
        let arrow = arrow_schema(&schema)?;
        Ok(Self { schema, arrow })
    }

    #[must_use]
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.arrow)
    }

    pub fn to_record_batch(&self, batch: &Batch) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = self
            .schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, attr)| column(attr, i, batch))
            .collect();
        RecordBatch::try_new(Arc::clone(&self.arrow), columns)
            .with_context(|| format!("build record batch for block {}", batch.seq))
    }
}

impl BlockEncoder for ColumnarEncoder {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock> {
        Ok(EncodedBlock {
            seq: batch.seq,
            rows: batch.len(),
            payload: Payload::Columns(self.to_record_batch(batch)?),
        })
    }
}

/// Rebuild the ARFF kind of a field from its metadata. Fields without
/// metadata are mapped back from their Arrow type.
pub fn kind_from_field(field: &Field) -> Option<AttributeKind> {
    let meta = field.metadata();
    match meta.get(META_KIND).map(String::as_str) {
        Some("numeric") => Some(AttributeKind::Numeric),
        Some("integer") => Some(AttributeKind::Integer),
        Some("string") => Some(AttributeKind::String),
        Some("nominal") => {
            let labels: Vec<String> = serde_json::from_str(meta.get(META_DOMAIN)?).ok()?;
            crate::schema::Domain::new(labels).ok().map(AttributeKind::Nominal)
        }
        Some("date") => {
            let pattern = meta
                .get(META_DATE_FORMAT)
                .map_or(crate::schema::DEFAULT_DATE_PATTERN, String::as_str);
            crate::schema::DateFormat::new(pattern).ok().map(AttributeKind::Date)
        }
        Some(_) => None,
        None => match field.data_type() {
            DataType::Float64 | DataType::Float32 => Some(AttributeKind::Numeric),
            DataType::Int64 | DataType::Int32 => Some(AttributeKind::Integer),
            DataType::Utf8 | DataType::LargeUtf8 => Some(AttributeKind::String),
            DataType::Timestamp(_, _) => {
                Some(AttributeKind::Date(crate::schema::DateFormat::default()))
            }
            _ => None,
        },
    }
}

/// Rebuild a document schema from an Arrow schema written by this crate.
pub fn document_schema(arrow: &Schema) -> Result<DocumentSchema> {
    let relation = arrow
        .metadata()
        .get(META_RELATION)
        .cloned()
        .unwrap_or_default();
    let mut doc = DocumentSchema::new(relation);
    for (i, f) in arrow.fields().iter().enumerate() {
        let kind = kind_from_field(f)
            .with_context(|| format!("no ARFF kind for column `{}`", f.name()))?;
        doc.add_attribute(f.name(), kind, i + 1)?;
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DateFormat, Domain};
    use arrow::array::Array;

    fn schema() -> Arc<DocumentSchema> {
        Arc::new(
            DocumentSchema::new("iris")
                .with_attribute("w", AttributeKind::Numeric)
                .unwrap()
                .with_attribute("n", AttributeKind::Integer)
                .unwrap()
                .with_attribute("c", AttributeKind::Nominal(Domain::new(["a", "b"]).unwrap()))
                .unwrap()
                .with_attribute("d", AttributeKind::Date(DateFormat::new("yyyy-MM-dd").unwrap()))
                .unwrap(),
        )
    }

    #[test]
    fn schema_metadata_round_trips() {
        let s = schema();
        let arrow = arrow_schema(&s).unwrap();
        assert_eq!(arrow.field(2).metadata()[META_DOMAIN], r#"["a","b"]"#);
        let back = document_schema(&arrow).unwrap();
        assert_eq!(&back, s.as_ref());
    }

    #[test]
    fn missing_becomes_null_and_fast_mode_text_survives() {
        let enc = ColumnarEncoder::new(schema()).unwrap();
        let batch = Batch::new(
            0,
            0,
            vec![
                vec![Cell::number(1.5), Cell::integer(2), Cell::Nominal(1), Cell::Missing],
                vec![Cell::Missing, Cell::Missing, Cell::Text("z".into()), Cell::Missing],
            ],
        );
        let rb = enc.to_record_batch(&batch).unwrap();
        assert_eq!(rb.num_rows(), 2);
        assert_eq!(rb.column(0).null_count(), 1);
        let labels = rb.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(labels.value(0), "b");
        assert_eq!(labels.value(1), "z");
        assert_eq!(rb.column(3).null_count(), 2);
    }
}
