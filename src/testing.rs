//! Testing utilities for ARFF conversions.
//!
//! - **Fixtures**: sample ARFF documents covering every attribute kind,
//!   dense and sparse rows, and the edge cases of the grammar.
//! - **Assertions**: typed-error checks, warning checks, artifact comparison.
//! - [`TestWorkspace`]: a temporary directory with helpers to write inputs,
//!   run conversions into it, and read artifacts back.
//!
//! # Quick Start
//!
//! ```no_run
//! use arffbeam::testing::*;
//! use arffbeam::writer::TargetFormat;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ws = TestWorkspace::new()?;
//! let input = ws.write("test.arff", SCENARIO_ARFF)?;
//! let result = ws.convert(&input, TargetFormat::csv(), |job| job.chunk_size(1))?;
//! assert_lines(&result.output, &["a,b", "1.5,X", ",Y"]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

use crate::io::compression::{FinishWrite, auto_detect_writer};
use crate::job::{ConversionJob, ConversionJobBuilder, ConversionResult};
use crate::orchestrator::convert;
use crate::writer::TargetFormat;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory removed on drop.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp dir")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the workspace. Nothing is created.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name`. A compression extension (`.gz`, `.zst`,
    /// ...) compresses the file accordingly.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut out = auto_detect_writer(file, &path)?;
        out.write_all(contents.as_ref())?;
        out.finish().with_context(|| format!("finish {}", path.display()))?;
        Ok(path)
    }

    pub fn read_string(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }

    /// Convert `input` into this workspace. `configure` adjusts the job
    /// builder before it is built; the output defaults to the workspace
    /// directory.
    pub fn convert(
        &self,
        input: impl AsRef<Path>,
        format: TargetFormat,
        configure: impl FnOnce(ConversionJobBuilder) -> ConversionJobBuilder,
    ) -> Result<ConversionResult> {
        let builder = ConversionJob::builder(input.as_ref(), format).output_dir(self.path());
        convert(configure(builder).build()?)
    }
}

/// Read a Parquet artifact back: its Arrow schema and every record batch.
#[cfg(feature = "io-parquet")]
pub fn read_parquet(
    path: impl AsRef<Path>,
) -> Result<(arrow::datatypes::SchemaRef, Vec<arrow::record_batch::RecordBatch>)> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let path = path.as_ref();
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Read an Arrow IPC artifact back: its schema and every record batch.
#[cfg(feature = "io-ipc")]
pub fn read_ipc(
    path: impl AsRef<Path>,
) -> Result<(arrow::datatypes::SchemaRef, Vec<arrow::record_batch::RecordBatch>)> {
    use arrow::ipc::reader::FileReader;

    let path = path.as_ref();
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = FileReader::try_new(file, None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}
