//! # arffbeam
//!
//! A **streaming ARFF converter** for Rust. arffbeam reads Attribute-Relation
//! File Format datasets (dense or sparse, optionally compressed) and writes
//! them as CSV, JSON, XML, XLSX, Parquet or Arrow IPC, with the same output
//! whether batches are encoded on one thread or many.
//!
//! ## Key Features
//!
//! - **Full ARFF grammar** - numeric, integer, real, string, date and nominal
//!   attributes; quoted values with escapes; dense and sparse rows
//! - **Strict or fast** - strict mode fails on the first malformed value; fast
//!   mode repairs it and records a [`ConversionWarning`]
//! - **Streaming** - rows are read in fixed-size batches, from a memory-mapped
//!   file or a buffered stream
//! - **Order-preserving parallelism** - batches are coerced and encoded on a
//!   worker pool and committed strictly in source order
//! - **Six writers** - all optional via feature flags
//! - **Compressed inputs and outputs** - gzip, zstd, bzip2 and xz by extension
//!
//! ## Quick Start
//!
//! ```no_run
//! use arffbeam::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let job = ConversionJob::builder("weather.arff", TargetFormat::Parquet)
//!     .output("out/weather.parquet")
//!     .parallel(true)
//!     .build()?;
//!
//! let result = convert(job)?;
//! println!("{result}");
//! for w in &result.warnings {
//!     println!("  {w}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Schema and rows
//!
//! The header becomes a [`DocumentSchema`]: a relation name and an ordered
//! list of [`AttributeSchema`]s. Each data line becomes a [`Row`] of [`Cell`]s
//! aligned with it. `?` is always [`Cell::Missing`]; sparse rows fill the
//! indices they omit with Missing too.
//!
//! ### Batches
//!
//! A [`ChunkedSource`] groups rows into [`RawBatch`]es of at most `chunk_size`
//! rows, numbered from 0 without gaps. Coercion turns a raw batch into a typed
//! [`Batch`]. Batches are the unit of parallel work and of writing.
//!
//! ### Writers
//!
//! Every target implements [`FormatWriter`]: blocks are appended in strictly
//! increasing sequence order and `close` is called exactly once. The
//! spreadsheet writer cannot stream (the sheet dimension precedes the data),
//! so it holds every row until close.
//!
//! ### Execution Modes
//!
//! - **Sequential** - one batch in flight
//! - **Parallel** - one parser thread, a rayon pool for coercion and encoding,
//!   and a [`ReorderBuffer`] that releases blocks in order
//!
//! Both modes produce byte-identical artifacts.
//!
//! ## Errors
//!
//! Parsing and coercion raise [`ArffError`]; jobs return `anyhow::Result` so
//! I/O failures carry path context. Recover the typed cause with
//! `err.downcast_ref::<ArffError>()`. A failed job never leaves a partial
//! artifact at the destination.
//!
//! ## Feature Flags
//!
//! - `io-csv`, `io-json`, `io-xml`, `io-xlsx`, `io-parquet`, `io-ipc` - writers
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//! - `parallel` - parallel batch encoding (falls back to sequential when off)
//! - `memory-map` - memory-mapped file input
//! - `metrics` - per-job [`MetricsCollector`](metrics::MetricsCollector)
//!
//! ## Module Overview
//!
//! - [`schema`] / [`cell`] - the data model
//! - [`parser`] - header grammar and data tokenizer
//! - [`coerce`] - tokens to typed cells, strict or fast
//! - [`source`] - byte sources and the chunked row source
//! - [`writer`] - the writer contract and one module per format
//! - [`orchestrator`] - runs jobs, sequentially or in parallel
//! - [`io`] - compression codecs and glob expansion
//! - [`testing`] - fixtures and assertions for tests

pub mod batch;
pub mod cell;
pub mod coerce;
pub mod error;
pub mod io;
pub mod job;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod reorder;
pub mod schema;
pub mod source;
pub mod testing;
pub mod warnings;
pub mod writer;

pub use batch::{Batch, RawBatch};
pub use cell::{Cell, Row};
pub use coerce::CoercionPolicy;
pub use error::{ArffError, ArffResult, ErrorKind};
pub use job::{CancelToken, ConversionJob, ConversionJobBuilder, ConversionResult};
pub use orchestrator::{BatchOptions, Converter, JobState, convert, convert_glob, convert_many};
pub use parser::{ArffReader, ParseOptions, Record};
pub use reorder::ReorderBuffer;
pub use schema::{AttributeKind, AttributeSchema, DateFormat, DocumentSchema, Domain};
pub use source::{ByteSource, ChunkedSource, InputSource};
pub use warnings::{ConversionWarning, WarningCollector, WarningKind};
pub use writer::{FormatWriter, JsonLayout, TargetFormat, WriterOptions, open_writer};
