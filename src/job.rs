//! Job configuration and results.
//!
//! A [`ConversionJob`] is built once, validated in
//! [`ConversionJobBuilder::build`], and consumed by the orchestrator. The
//! defaults match what the command-line tool has always used: 10 000-row
//! chunks (50 000 in fast mode unless set explicitly), memory-mapped input,
//! one worker per CPU.
//!
//! ```no_run
//! use arffbeam::job::ConversionJob;
//! use arffbeam::writer::TargetFormat;
//!
//! let job = ConversionJob::builder("data/weather.arff", TargetFormat::csv())
//!     .output_dir("out")
//!     .fast_mode(true)
//!     .parallel(true)
//!     .build()?;
//! assert_eq!(job.output(), std::path::Path::new("out/weather.csv"));
//! # Ok::<(), anyhow::Error>(())
//! ```

#[cfg(feature = "metrics")]
use crate::metrics::MetricsCollector;
use crate::error::ArffError;
use crate::io::compression::strip_compression_suffix;
use crate::source::InputSource;
use crate::warnings::{ConversionWarning, WarningKind};
use crate::writer::{TargetFormat, WriterOptions};
use anyhow::{Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const FAST_MODE_CHUNK_SIZE: usize = 50_000;

/// External cancellation signal, shared between the caller and the job.
///
/// Cancelling stops dispatch of new batches; batches already being encoded
/// finish, then the partial artifact is discarded and the job fails with
/// [`ArffError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One conversion: input, target and execution settings.
pub struct ConversionJob {
    pub(crate) input: InputSource,
    pub(crate) output: PathBuf,
    pub(crate) format: TargetFormat,
    pub(crate) fast_mode: bool,
    pub(crate) parallel: bool,
    pub(crate) chunk_size: usize,
    pub(crate) memory_map: bool,
    pub(crate) workers: usize,
    pub(crate) writer_options: WriterOptions,
    pub(crate) cancel: CancelToken,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<MetricsCollector>,
}

impl ConversionJob {
    pub fn builder(input: impl Into<InputSource>, format: TargetFormat) -> ConversionJobBuilder {
        ConversionJobBuilder::new(input.into(), format)
    }

    #[must_use]
    pub fn input(&self) -> &InputSource {
        &self.input
    }

    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    #[must_use]
    pub fn format(&self) -> TargetFormat {
        self.format
    }

    #[must_use]
    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn memory_map(&self) -> bool {
        self.memory_map
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionJob")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("format", &self.format)
            .field("fast_mode", &self.fast_mode)
            .field("parallel", &self.parallel)
            .field("chunk_size", &self.chunk_size)
            .field("memory_map", &self.memory_map)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

pub struct ConversionJobBuilder {
    input: InputSource,
    format: TargetFormat,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    fast_mode: bool,
    parallel: bool,
    chunk_size: Option<usize>,
    memory_map: bool,
    workers: Option<usize>,
    writer_options: WriterOptions,
    cancel: CancelToken,
    #[cfg(feature = "metrics")]
    metrics: Option<MetricsCollector>,
}

impl ConversionJobBuilder {
    fn new(input: InputSource, format: TargetFormat) -> Self {
        Self {
            input,
            format,
            output: None,
            output_dir: None,
            fast_mode: false,
            parallel: false,
            chunk_size: None,
            memory_map: true,
            workers: None,
            writer_options: WriterOptions::default(),
            cancel: CancelToken::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Explicit destination path.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Directory for a derived `<stem>.<ext>` destination. Ignored when an
    /// explicit [`output`](Self::output) is set.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn fast_mode(mut self, on: bool) -> Self {
        self.fast_mode = on;
        self
    }

    #[must_use]
    pub fn parallel(mut self, on: bool) -> Self {
        self.parallel = on;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    #[must_use]
    pub fn memory_map(mut self, on: bool) -> Self {
        self.memory_map = on;
        self
    }

    /// Worker pool size for parallel mode. Defaults to the CPU count.
    #[must_use]
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    #[must_use]
    pub fn writer_options(mut self, options: WriterOptions) -> Self {
        self.writer_options = options;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ConversionJob> {
        if !self.format.is_enabled() {
            return Err(ArffError::UnsupportedFormat(format!(
                "{} (feature not enabled)",
                self.format
            ))
            .into());
        }
        let chunk_size = self.chunk_size.unwrap_or(if self.fast_mode {
            FAST_MODE_CHUNK_SIZE
        } else {
            DEFAULT_CHUNK_SIZE
        });
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        let workers = self.workers.unwrap_or_else(num_cpus::get);
        if workers == 0 {
            bail!("worker count must be positive");
        }
        let output = match self.output {
            Some(p) => p,
            None => derive_output(&self.input, self.output_dir.as_deref(), self.format),
        };
        Ok(ConversionJob {
            input: self.input,
            output,
            format: self.format,
            fast_mode: self.fast_mode,
            parallel: self.parallel,
            chunk_size,
            memory_map: self.memory_map,
            workers,
            writer_options: self.writer_options,
            cancel: self.cancel,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        })
    }
}

/// `<dir>/<stem>.<ext>`, where `stem` is the input file name without its
/// compression and `.arff` extensions and `dir` defaults to the input's
/// directory.
#[must_use]
pub fn derive_output(input: &InputSource, dir: Option<&Path>, format: TargetFormat) -> PathBuf {
    let (name, parent) = match input {
        InputSource::Path(p) => (
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            p.parent().map(Path::to_path_buf),
        ),
        InputSource::Reader { name, .. } => (name.clone(), None),
    };
    let name = strip_compression_suffix(&name);
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("arff") && !stem.is_empty() => stem,
        _ => name,
    };
    let stem = if stem.is_empty() { "output" } else { stem };
    let dir = dir.map(Path::to_path_buf).or(parent).unwrap_or_default();
    dir.join(format!("{stem}.{}", format.extension()))
}

/// What a successful job produced.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub output: PathBuf,
    pub format: TargetFormat,
    pub rows: u64,
    pub batches: u64,
    pub elapsed: Duration,
    pub output_bytes: u64,
    /// Fast-mode repairs, in source order.
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    #[must_use]
    pub fn warning_count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows -> {} ({}, {} bytes) in {:.3}s",
            self.rows,
            self.output.display(),
            self.format,
            self.output_bytes,
            self.elapsed.as_secs_f64()
        )?;
        if !self.warnings.is_empty() {
            write!(f, ", {} warnings", self.warnings.len())?;
        }
        Ok(())
    }
}
