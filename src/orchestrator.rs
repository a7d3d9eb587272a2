//! Conversion orchestrator.
//!
//! Wires source → coercion → encoding → writer for one job and owns the
//! lifecycle of every stage:
//!
//! ```text
//! Idle → Parsing → Writing (sequential | parallel) → Finalizing → Done
//!   └──────────────────────────┴──────────────────────┴──────→ Failed
//! ```
//!
//! # Sequential mode
//! One batch in flight: parse, coerce, encode, append, repeat.
//!
//! # Parallel mode
//! Parsing stays on a single dispatcher thread. Each [`RawBatch`] is handed
//! to a rayon pool, where workers coerce and encode it; results flow back to
//! the calling thread, which is the only one that touches the writer. A
//! [`ReorderBuffer`] releases blocks strictly in sequence order, so the
//! artifact is byte-for-byte the same as in sequential mode. A permit
//! channel bounds how many batches are in flight (two per worker).
//!
//! Errors travel the same ordered path as data, so the error a job reports
//! is always the first fatal one in source order.
//!
//! # Failure
//! The artifact is staged at `<output>.partial` and renamed into place only
//! after a successful close. On any failure (including cancellation) the
//! writer is still closed, then the staging file is removed.

use crate::batch::RawBatch;
use crate::coerce::CoercionPolicy;
use crate::error::ArffError;
use crate::io::glob::expand_glob_required;
use crate::job::{CancelToken, ConversionJob, ConversionJobBuilder, ConversionResult};
use crate::parser::ParseOptions;
use crate::reorder::ReorderBuffer;
use crate::schema::DocumentSchema;
use crate::source::{ByteSource, ChunkedSource};
use crate::warnings::{ConversionWarning, WarningCollector};
use crate::writer::{BlockEncoder, EncodedBlock, FormatWriter, TargetFormat, open_writer};
use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

/// Lifecycle of a [`Converter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Parsing,
    Writing { parallel: bool },
    Finalizing,
    Done,
    Failed,
}

/// What the writing phase committed.
#[derive(Debug, Default)]
struct Committed {
    rows: u64,
    batches: u64,
    warnings: WarningCollector,
    reorder_peak: usize,
}

impl Committed {
    fn commit(
        &mut self,
        writer: &mut dyn FormatWriter,
        block: EncodedBlock,
        warnings: Vec<ConversionWarning>,
    ) -> Result<()> {
        let (seq, rows) = (block.seq, block.rows);
        writer.write_block(block)?;
        self.rows += rows as u64;
        self.batches += 1;
        self.warnings.extend(warnings);
        tracing::trace!(seq, rows, "committed block");
        Ok(())
    }
}

type WorkResult = Result<(EncodedBlock, Vec<ConversionWarning>)>;

fn encode_raw(
    raw: RawBatch,
    schema: &DocumentSchema,
    policy: CoercionPolicy,
    encoder: &dyn BlockEncoder,
) -> WorkResult {
    let batch = raw.coerce(schema, policy)?;
    let block = encoder.encode(&batch)?;
    Ok((block, batch.warnings))
}

/// Runs one [`ConversionJob`].
#[derive(Debug)]
pub struct Converter {
    job: Option<ConversionJob>,
    state: JobState,
}

impl Converter {
    #[must_use]
    pub fn new(job: ConversionJob) -> Self {
        Self {
            job: Some(job),
            state: JobState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!(from = ?self.state, to = ?next, "job state");
        self.state = next;
    }

    /// Run the job to completion. A converter runs once.
    pub fn run(&mut self) -> Result<ConversionResult> {
        let mut job = self
            .job
            .take()
            .ok_or_else(|| anyhow!("conversion job already ran"))?;
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        if let Some(m) = &job.metrics {
            m.record_start();
        }
        tracing::info!(
            input = %job.input.name(),
            output = %job.output.display(),
            format = %job.format,
            fast_mode = job.fast_mode,
            parallel = job.parallel,
            chunk_size = job.chunk_size,
            "starting conversion"
        );

        let staging = staging_path(&job.output);
        let outcome = self.execute(&mut job, &staging);
        #[cfg(feature = "metrics")]
        if let Some(m) = &job.metrics {
            m.record_end();
        }

        let committed = match outcome.and_then(|c| {
            fs::rename(&staging, &job.output).with_context(|| {
                format!("rename {} to {}", staging.display(), job.output.display())
            })?;
            Ok(c)
        }) {
            Ok(c) => c,
            Err(e) => {
                self.transition(JobState::Failed);
                discard(&staging);
                tracing::error!(output = %job.output.display(), error = %e, "conversion failed");
                return Err(e);
            }
        };

        let output_bytes = fs::metadata(&job.output)
            .with_context(|| format!("stat {}", job.output.display()))?
            .len();
        self.transition(JobState::Done);

        #[cfg(feature = "metrics")]
        if let Some(m) = &job.metrics {
            use crate::metrics::{BATCHES_WRITTEN, OUTPUT_BYTES, REORDER_PEAK, ROWS_WRITTEN, WARNINGS};
            m.set_counter(ROWS_WRITTEN, committed.rows);
            m.set_counter(BATCHES_WRITTEN, committed.batches);
            m.set_counter(WARNINGS, committed.warnings.len() as u64);
            m.set_counter(OUTPUT_BYTES, output_bytes);
            m.set_counter(REORDER_PEAK, committed.reorder_peak as u64);
        }

        let result = ConversionResult {
            output: job.output.clone(),
            format: job.format,
            rows: committed.rows,
            batches: committed.batches,
            elapsed: started.elapsed(),
            output_bytes,
            warnings: committed.warnings.into_vec(),
        };
        tracing::info!(%result, "conversion finished");
        Ok(result)
    }

    fn execute(&mut self, job: &mut ConversionJob, staging: &Path) -> Result<Committed> {
        self.transition(JobState::Parsing);
        let input = std::mem::replace(&mut job.input, crate::source::InputSource::Path(PathBuf::new()));
        let source = ChunkedSource::open(
            input,
            job.memory_map,
            ParseOptions {
                fast_mode: job.fast_mode,
            },
            job.chunk_size,
        )?;
        let schema = Arc::clone(source.schema());
        tracing::debug!(
            relation = schema.relation(),
            attributes = schema.len(),
            "parsed header"
        );

        if let Some(parent) = job.output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let file = File::create(staging).with_context(|| format!("create {}", staging.display()))?;
        let mut writer = open_writer(job.format, Arc::clone(&schema), file, &job.output, &job.writer_options)?;

        let policy = CoercionPolicy {
            fast_mode: job.fast_mode,
        };
        let parallel = job.parallel && cfg!(feature = "parallel") && job.workers > 1;
        if job.parallel && !parallel {
            tracing::debug!(workers = job.workers, "parallel mode unavailable, writing sequentially");
        }
        self.transition(JobState::Writing { parallel });
        let driven = if parallel {
            drive_parallel(source, &schema, policy, writer.as_mut(), job.workers, &job.cancel)
        } else {
            drive_sequential(source, &schema, policy, writer.as_mut(), &job.cancel)
        };

        self.transition(JobState::Finalizing);
        let closed = writer.close();
        let committed = driven?;
        let info = closed.with_context(|| format!("finalize {} artifact", job.format))?;
        debug_assert_eq!(info.rows, committed.rows);
        Ok(committed)
    }
}

/// Convert one job. Shorthand for `Converter::new(job).run()`.
pub fn convert(job: ConversionJob) -> Result<ConversionResult> {
    Converter::new(job).run()
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard(staging: &Path) {
    match fs::remove_file(staging) {
        Ok(()) => tracing::debug!(path = %staging.display(), "removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %staging.display(), error = %e, "could not remove partial artifact"),
    }
}

fn drive_sequential(
    source: ChunkedSource<ByteSource>,
    schema: &DocumentSchema,
    policy: CoercionPolicy,
    writer: &mut dyn FormatWriter,
    cancel: &CancelToken,
) -> Result<Committed> {
    let encoder = writer.encoder();
    let mut committed = Committed::default();
    for raw in source {
        if cancel.is_cancelled() {
            return Err(ArffError::Cancelled.into());
        }
        let (block, warnings) = encode_raw(raw?, schema, policy, encoder.as_ref())?;
        committed.commit(writer, block, warnings)?;
    }
    Ok(committed)
}

/// Why the dispatcher stopped handing out batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Exhausted,
    Cancelled,
    Aborted,
}

fn drive_parallel(
    source: ChunkedSource<ByteSource>,
    schema: &Arc<DocumentSchema>,
    policy: CoercionPolicy,
    writer: &mut dyn FormatWriter,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Committed> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("arffbeam-worker-{i}"))
        .build()
        .context("build worker pool")?;
    let encoder = writer.encoder();
    let window = workers.saturating_mul(2).max(2);

    let (permit_tx, permit_rx) = mpsc::sync_channel::<()>(window);
    for _ in 0..window {
        permit_tx
            .send(())
            .map_err(|_| anyhow!("permit channel closed"))?;
    }
    let (result_tx, result_rx) = mpsc::channel::<(u64, WorkResult)>();
    let abort = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let pool = &pool;
        let abort = &abort;
        let dispatcher = scope.spawn({
            let schema = Arc::clone(schema);
            let encoder = Arc::clone(&encoder);
            let cancel = cancel.clone();
            move || {
                let mut next_seq = 0u64;
                for raw in source {
                    if permit_rx.recv().is_err() || abort.load(Ordering::Acquire) {
                        return Dispatch::Aborted;
                    }
                    if cancel.is_cancelled() {
                        return Dispatch::Cancelled;
                    }
                    match raw {
                        Ok(raw) => {
                            let seq = raw.seq;
                            next_seq = seq + 1;
                            let tx = result_tx.clone();
                            let schema = Arc::clone(&schema);
                            let encoder = Arc::clone(&encoder);
                            pool.spawn(move || {
                                let out = encode_raw(raw, &schema, policy, encoder.as_ref());
                                let _ = tx.send((seq, out));
                            });
                        }
                        Err(e) => {
                            let _ = result_tx.send((next_seq, Err(e.into())));
                            return Dispatch::Aborted;
                        }
                    }
                }
                Dispatch::Exhausted
            }
        });

        let committed = commit_in_order(result_rx.iter(), writer, || {
            let _ = permit_tx.send(());
        });
        if committed.is_err() {
            abort.store(true, Ordering::Release);
        }
        // Unblocks a dispatcher waiting for a permit; in-flight workers
        // finish and their sends fail quietly.
        drop(permit_tx);
        drop(result_rx);

        let dispatch = dispatcher
            .join()
            .map_err(|_| anyhow!("dispatcher thread panicked"))?;
        let committed = committed?;
        match dispatch {
            Dispatch::Cancelled => Err(ArffError::Cancelled.into()),
            Dispatch::Aborted if cancel.is_cancelled() => Err(ArffError::Cancelled.into()),
            _ => {
                tracing::debug!(peak = committed.reorder_peak, "reorder buffer drained");
                Ok(committed)
            }
        }
    })
}

/// Commit `(seq, result)` pairs in sequence order as they arrive, calling
/// `released` after each commit. Stops at the first failure in sequence
/// order. A batch still waiting once `results` ends means one of its
/// predecessors never arrived, which is an error.
fn commit_in_order(
    results: impl IntoIterator<Item = (u64, WorkResult)>,
    writer: &mut dyn FormatWriter,
    mut released: impl FnMut(),
) -> Result<Committed> {
    let mut committed = Committed::default();
    let mut reorder: ReorderBuffer<WorkResult> = ReorderBuffer::new();
    for (seq, result) in results {
        reorder.push(seq, result);
        committed.reorder_peak = committed.reorder_peak.max(reorder.pending());
        while let Some((_, ready)) = reorder.pop_ready() {
            let (block, warnings) = ready?;
            committed.commit(writer, block, warnings)?;
            released();
        }
    }
    if !reorder.is_empty() {
        bail!(
            "batch {} never completed; {} later batches were not written",
            reorder.next_seq(),
            reorder.pending()
        );
    }
    Ok(committed)
}

/// Settings shared by every file of a batch conversion.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub fast_mode: bool,
    /// Convert files concurrently (one job per rayon task).
    pub parallel_files: bool,
    /// Parallel encoding inside each job.
    pub parallel_batches: bool,
    pub chunk_size: Option<usize>,
    pub memory_map: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            fast_mode: false,
            parallel_files: true,
            parallel_batches: false,
            chunk_size: None,
            memory_map: true,
        }
    }
}

impl BatchOptions {
    fn job(&self, input: &Path, output_dir: &Path, format: TargetFormat) -> ConversionJobBuilder {
        let mut b = ConversionJob::builder(input, format)
            .output_dir(output_dir)
            .fast_mode(self.fast_mode)
            .parallel(self.parallel_batches)
            .memory_map(self.memory_map);
        if let Some(n) = self.chunk_size {
            b = b.chunk_size(n);
        }
        b
    }
}

/// Convert every file in `inputs` into `output_dir`. Results come back in
/// input order, one per file; a failing file does not stop the others.
/// Inputs whose derived output name was already claimed by an earlier input
/// fail without running.
pub fn convert_many(
    inputs: &[PathBuf],
    output_dir: &Path,
    format: TargetFormat,
    options: &BatchOptions,
) -> Vec<Result<ConversionResult>> {
    let mut claimed = HashSet::new();
    let jobs: Vec<Result<ConversionJob>> = inputs
        .iter()
        .map(|input| {
            let job = options.job(input, output_dir, format).build()?;
            if !claimed.insert(job.output().to_path_buf()) {
                return Err(anyhow!(
                    "{} would overwrite the output of an earlier input ({})",
                    input.display(),
                    job.output().display()
                ));
            }
            Ok(job)
        })
        .collect();

    let run = |job: Result<ConversionJob>| job.and_then(convert);
    if options.parallel_files {
        jobs.into_par_iter().map(run).collect()
    } else {
        jobs.into_iter().map(run).collect()
    }
}

/// [`convert_many`] over the files matching `pattern`. Zero matches is an error.
pub fn convert_glob(
    pattern: &str,
    output_dir: &Path,
    format: TargetFormat,
    options: &BatchOptions,
) -> Result<Vec<Result<ConversionResult>>> {
    let inputs = expand_glob_required(pattern)?;
    tracing::info!(pattern, files = inputs.len(), "batch conversion");
    Ok(convert_many(&inputs, output_dir, format, options))
}
