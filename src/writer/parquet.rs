//! Parquet output: one row group per committed block, snappy-compressed,
//! with the Arrow schema (and its ARFF metadata) embedded in the footer.

use super::columnar::ColumnarEncoder;
use super::{ArtifactInfo, BlockEncoder, EncodedBlock, FormatWriter, Payload, SeqGate, TargetFormat};
use crate::schema::DocumentSchema;
use anyhow::{Context, Result, bail};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::sync::Arc;

pub struct ParquetWriter {
    writer: ArrowWriter<File>,
    encoder: Arc<ColumnarEncoder>,
    gate: SeqGate,
}

impl ParquetWriter {
    pub fn open(schema: Arc<DocumentSchema>, file: File) -> Result<Self> {
        let encoder = Arc::new(ColumnarEncoder::new(schema)?);
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, encoder.arrow_schema(), Some(props))
            .context("create ArrowWriter")?;
        Ok(Self {
            writer,
            encoder,
            gate: SeqGate::default(),
        })
    }
}

impl FormatWriter for ParquetWriter {
    fn format(&self) -> TargetFormat {
        TargetFormat::Parquet
    }

    fn encoder(&self) -> Arc<dyn BlockEncoder> {
        self.encoder.clone()
    }

    fn write_block(&mut self, block: EncodedBlock) -> Result<()> {
        self.gate.admit(&block)?;
        let Payload::Columns(batch) = block.payload else {
            bail!("parquet writer received a text block");
        };
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer
            .write(&batch)
            .with_context(|| format!("write block {} to parquet", block.seq))?;
        self.writer.flush().context("flush parquet row group")?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<ArtifactInfo> {
        let info = self.gate.info();
        self.writer.close().context("close ArrowWriter")?;
        Ok(info)
    }
}
