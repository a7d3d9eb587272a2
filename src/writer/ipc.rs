//! Arrow IPC file output (Feather v2): zstd-compressed record batches,
//! footer with schema and block index written at close.

use super::columnar::ColumnarEncoder;
use super::{ArtifactInfo, BlockEncoder, EncodedBlock, FormatWriter, Payload, SeqGate, TargetFormat};
use crate::schema::DocumentSchema;
use anyhow::{Context, Result, bail};
use arrow::ipc::CompressionType;
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

pub struct IpcWriter {
    writer: FileWriter<BufWriter<File>>,
    encoder: Arc<ColumnarEncoder>,
    gate: SeqGate,
}

impl IpcWriter {
    pub fn open(schema: Arc<DocumentSchema>, file: File) -> Result<Self> {
        let encoder = Arc::new(ColumnarEncoder::new(schema)?);
        let options = IpcWriteOptions::default()
            .try_with_compression(Some(CompressionType::ZSTD))
            .context("enable IPC zstd compression")?;
        let writer = FileWriter::try_new_with_options(
            BufWriter::new(file),
            encoder.arrow_schema().as_ref(),
            options,
        )
        .context("create IPC FileWriter")?;
        Ok(Self {
            writer,
            encoder,
            gate: SeqGate::default(),
        })
    }
}

impl FormatWriter for IpcWriter {
    fn format(&self) -> TargetFormat {
        TargetFormat::ArrowIpc
    }

    fn encoder(&self) -> Arc<dyn BlockEncoder> {
        self.encoder.clone()
    }

    fn write_block(&mut self, block: EncodedBlock) -> Result<()> {
        self.gate.admit(&block)?;
        let Payload::Columns(batch) = block.payload else {
            bail!("arrow writer received a text block");
        };
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer
            .write(&batch)
            .with_context(|| format!("write block {} to arrow file", block.seq))
    }

    fn close(self: Box<Self>) -> Result<ArtifactInfo> {
        let info = self.gate.info();
        let buffered = self.writer.into_inner().context("finish arrow file")?;
        buffered
            .into_inner()
            .map_err(|e| e.into_error())
            .context("flush arrow file")?;
        Ok(info)
    }
}
