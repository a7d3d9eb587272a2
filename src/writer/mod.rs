//! Format writers.
//!
//! Every target implements one contract, [`FormatWriter`]:
//! open (construct from a schema and a destination), then `write_block` for
//! each batch in strictly increasing sequence order, then `close` exactly once.
//!
//! Writing is split in two so parallel jobs can spread the expensive half
//! across workers:
//! - a [`BlockEncoder`] turns a typed [`Batch`] into an [`EncodedBlock`]
//!   (serialized text, spreadsheet rows, or an Arrow `RecordBatch`). Encoders
//!   are `Send + Sync` and stateless, so any worker can run them.
//! - the writer appends encoded blocks to the artifact. Only the committer
//!   thread touches it, in sequence order.
//!
//! Because each block's encoding depends only on its batch, the bytes a
//! parallel run produces are identical to a sequential run.

use crate::batch::Batch;
use crate::io::compression::{DynWrite, FinishWrite, auto_detect_writer};
use crate::schema::DocumentSchema;
use anyhow::{Context, Result, bail};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(any(feature = "io-parquet", feature = "io-ipc"))]
pub mod columnar;
#[cfg(feature = "io-csv")]
pub mod csv;
#[cfg(feature = "io-ipc")]
pub mod ipc;
#[cfg(feature = "io-json")]
pub mod json;
#[cfg(feature = "io-parquet")]
pub mod parquet;
#[cfg(feature = "io-xlsx")]
pub mod xlsx;
#[cfg(feature = "io-xml")]
pub mod xml;

/// Object-notation layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonLayout {
    /// One JSON array of row objects.
    #[default]
    Array,
    /// One object per line (JSON Lines).
    Lines,
}

/// Target format of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Delimited text; `,` for CSV, tab for TSV.
    Csv { delimiter: u8 },
    Json(JsonLayout),
    Xml,
    /// Spreadsheet grid. Cannot stream: rows are held in memory until close.
    Xlsx,
    Parquet,
    /// Arrow IPC file (Feather v2).
    ArrowIpc,
}

impl TargetFormat {
    #[must_use]
    pub fn csv() -> Self {
        TargetFormat::Csv { delimiter: b',' }
    }

    /// Canonical short name, accepted back by [`FromStr`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TargetFormat::Csv { delimiter: b'\t' } => "tsv",
            TargetFormat::Csv { .. } => "csv",
            TargetFormat::Json(JsonLayout::Array) => "json",
            TargetFormat::Json(JsonLayout::Lines) => "jsonl",
            TargetFormat::Xml => "xml",
            TargetFormat::Xlsx => "xlsx",
            TargetFormat::Parquet => "parquet",
            TargetFormat::ArrowIpc => "arrow",
        }
    }

    /// File extension for derived output names.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.name()
    }

    /// Whether blocks reach the artifact as they are committed. The
    /// spreadsheet writer buffers the whole grid instead.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        !matches!(self, TargetFormat::Xlsx)
    }

    /// Whether the backend for this format was compiled in.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            TargetFormat::Csv { .. } => cfg!(feature = "io-csv"),
            TargetFormat::Json(_) => cfg!(feature = "io-json"),
            TargetFormat::Xml => cfg!(feature = "io-xml"),
            TargetFormat::Xlsx => cfg!(feature = "io-xlsx"),
            TargetFormat::Parquet => cfg!(feature = "io-parquet"),
            TargetFormat::ArrowIpc => cfg!(feature = "io-ipc"),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetFormat {
    type Err = crate::error::ArffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "csv" => TargetFormat::csv(),
            "tsv" => TargetFormat::Csv { delimiter: b'\t' },
            "json" => TargetFormat::Json(JsonLayout::Array),
            "jsonl" | "ndjson" => TargetFormat::Json(JsonLayout::Lines),
            "xml" => TargetFormat::Xml,
            "xlsx" | "excel" => TargetFormat::Xlsx,
            "parquet" => TargetFormat::Parquet,
            "arrow" | "feather" | "ipc" => TargetFormat::ArrowIpc,
            other => return Err(crate::error::ArffError::UnsupportedFormat(other.to_string())),
        })
    }
}

/// Knobs shared by the writers; each backend reads the ones it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Element name wrapping each row in XML output.
    pub record_element: String,
    /// Worksheet name in XLSX output.
    pub sheet_name: String,
    /// Emit the header row in delimited text.
    pub csv_header: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            record_element: "record".to_string(),
            sheet_name: "Data".to_string(),
            csv_header: true,
        }
    }
}

/// What an encoder produced for one batch.
pub enum Payload {
    /// Ready-to-append bytes (text formats, spreadsheet row XML).
    Bytes(Vec<u8>),
    /// A column-oriented block for the Arrow-based writers.
    #[cfg(any(feature = "io-parquet", feature = "io-ipc"))]
    Columns(arrow::record_batch::RecordBatch),
}

/// An encoded batch, tagged with its sequence index.
pub struct EncodedBlock {
    pub seq: u64,
    pub rows: usize,
    pub payload: Payload,
}

impl fmt::Debug for EncodedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.payload {
            Payload::Bytes(b) => format!("bytes({})", b.len()),
            #[cfg(any(feature = "io-parquet", feature = "io-ipc"))]
            Payload::Columns(rb) => format!("columns({}x{})", rb.num_rows(), rb.num_columns()),
        };
        f.debug_struct("EncodedBlock")
            .field("seq", &self.seq)
            .field("rows", &self.rows)
            .field("payload", &kind)
            .finish()
    }
}

/// Stateless batch → block transformation; safe to call from any worker.
pub trait BlockEncoder: Send + Sync {
    fn encode(&self, batch: &Batch) -> Result<EncodedBlock>;
}

/// Summary of a closed artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub rows: u64,
    pub blocks: u64,
}

/// The writer capability, implemented once per target format.
pub trait FormatWriter: Send {
    fn format(&self) -> TargetFormat;

    /// Encoder matching this writer's schema and options.
    fn encoder(&self) -> Arc<dyn BlockEncoder>;

    /// Append one block. Blocks must arrive in strictly increasing `seq` order.
    fn write_block(&mut self, block: EncodedBlock) -> Result<()>;

    /// Encode and append in one step.
    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let block = self.encoder().encode(batch)?;
        self.write_block(block)
    }

    /// Flush and finalize. Called exactly once, on success and failure paths
    /// alike.
    fn close(self: Box<Self>) -> Result<ArtifactInfo>;
}

/// Rejects out-of-order blocks and counts what went through.
#[derive(Debug, Default)]
pub(crate) struct SeqGate {
    last: Option<u64>,
    info: ArtifactInfo,
}

impl SeqGate {
    pub(crate) fn admit(&mut self, block: &EncodedBlock) -> Result<()> {
        if let Some(last) = self.last
            && block.seq <= last
        {
            bail!("block {} written after block {last}", block.seq);
        }
        self.last = Some(block.seq);
        self.info.rows += block.rows as u64;
        self.info.blocks += 1;
        Ok(())
    }

    pub(crate) fn info(&self) -> ArtifactInfo {
        self.info
    }
}

/// Streaming text artifact: a fixed prologue, encoded blocks with an
/// optional separator between non-empty ones, and a fixed epilogue.
pub(crate) struct TextWriter {
    format: TargetFormat,
    out: DynWrite,
    encoder: Arc<dyn BlockEncoder>,
    separator: &'static [u8],
    epilogue: Vec<u8>,
    gate: SeqGate,
    wrote_rows: bool,
}

impl TextWriter {
    pub(crate) fn new(
        format: TargetFormat,
        file: File,
        dest: &Path,
        encoder: Arc<dyn BlockEncoder>,
        prologue: &[u8],
        separator: &'static [u8],
        epilogue: Vec<u8>,
    ) -> Result<Self> {
        let mut out = auto_detect_writer(file, dest)?;
        out.write_all(prologue)?;
        Ok(Self {
            format,
            out,
            encoder,
            separator,
            epilogue,
            gate: SeqGate::default(),
            wrote_rows: false,
        })
    }
}

impl FormatWriter for TextWriter {
    fn format(&self) -> TargetFormat {
        self.format
    }

    fn encoder(&self) -> Arc<dyn BlockEncoder> {
        Arc::clone(&self.encoder)
    }

    fn write_block(&mut self, block: EncodedBlock) -> Result<()> {
        self.gate.admit(&block)?;
        let Payload::Bytes(bytes) = block.payload else {
            bail!("{} writer received a columnar block", self.format);
        };
        if bytes.is_empty() {
            return Ok(());
        }
        if self.wrote_rows {
            self.out.write_all(self.separator)?;
        }
        self.out.write_all(&bytes)?;
        self.wrote_rows = true;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<ArtifactInfo> {
        self.out.write_all(&self.epilogue)?;
        let (format, info) = (self.format, self.gate.info());
        self.out
            .finish()
            .with_context(|| format!("finish {format} output"))?;
        Ok(info)
    }
}

/// Open the writer for `format`, writing into `file`. `dest` is the final
/// artifact path; its extension selects output compression for text formats.
#[allow(unused_variables)]
pub fn open_writer(
    format: TargetFormat,
    schema: Arc<DocumentSchema>,
    file: File,
    dest: &Path,
    options: &WriterOptions,
) -> Result<Box<dyn FormatWriter>> {
    match format {
        #[cfg(feature = "io-csv")]
        TargetFormat::Csv { delimiter } => {
            Ok(Box::new(csv::open(schema, delimiter, file, dest, options)?))
        }
        #[cfg(feature = "io-json")]
        TargetFormat::Json(layout) => Ok(Box::new(json::open(schema, layout, file, dest)?)),
        #[cfg(feature = "io-xml")]
        TargetFormat::Xml => Ok(Box::new(xml::open(schema, file, dest, options)?)),
        #[cfg(feature = "io-xlsx")]
        TargetFormat::Xlsx => Ok(Box::new(xlsx::XlsxWriter::open(schema, file, options)?)),
        #[cfg(feature = "io-parquet")]
        TargetFormat::Parquet => Ok(Box::new(parquet::ParquetWriter::open(schema, file)?)),
        #[cfg(feature = "io-ipc")]
        TargetFormat::ArrowIpc => Ok(Box::new(ipc::IpcWriter::open(schema, file)?)),
        #[allow(unreachable_patterns)]
        other => Err(crate::error::ArffError::UnsupportedFormat(format!(
            "{other} (feature not enabled)"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for name in ["csv", "tsv", "json", "jsonl", "xml", "xlsx", "parquet", "arrow"] {
            let f: TargetFormat = name.parse().unwrap();
            assert_eq!(f.name(), name);
        }
        assert_eq!("Feather".parse::<TargetFormat>().unwrap(), TargetFormat::ArrowIpc);
        assert!("orc".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn seq_gate_rejects_regressions() {
        let block = |seq| EncodedBlock {
            seq,
            rows: 1,
            payload: Payload::Bytes(vec![]),
        };
        let mut gate = SeqGate::default();
        gate.admit(&block(0)).unwrap();
        gate.admit(&block(2)).unwrap();
        assert!(gate.admit(&block(2)).is_err());
        assert!(gate.admit(&block(1)).is_err());
        assert_eq!(gate.info(), ArtifactInfo { rows: 2, blocks: 2 });
    }
}
