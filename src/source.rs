//! Byte sources and the chunked row source.
//!
//! [`ByteSource`] hides whether the parser reads a memory-mapped file or a
//! buffered stream, so mapped/buffered and strict/fast stay independent
//! switches. [`ChunkedSource`] groups parsed records into [`RawBatch`]es of
//! at most `chunk_size` rows, tagged `0, 1, 2, ...` in source order.

use crate::batch::RawBatch;
use crate::error::{ArffError, ArffResult};
use crate::io::compression::{DynRead, auto_detect_reader, detect_from_extension};
use crate::parser::{ArffReader, ParseOptions};
use crate::schema::DocumentSchema;
use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a job reads its ARFF text from.
pub enum InputSource {
    Path(PathBuf),
    /// An already-open stream. `name` is used for compression detection
    /// and for deriving an output file name.
    Reader { name: String, reader: DynRead },
}

impl InputSource {
    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        InputSource::Reader {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// A short display name: the path, or the stream's name.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            InputSource::Path(p) => p.display().to_string(),
            InputSource::Reader { name, .. } => name.clone(),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputSource::Path(p) => Some(p),
            InputSource::Reader { .. } => None,
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            InputSource::Reader { name, .. } => f.debug_struct("Reader").field("name", name).finish(),
        }
    }
}

impl From<PathBuf> for InputSource {
    fn from(p: PathBuf) -> Self {
        InputSource::Path(p)
    }
}

impl From<&Path> for InputSource {
    fn from(p: &Path) -> Self {
        InputSource::Path(p.to_path_buf())
    }
}

impl From<&PathBuf> for InputSource {
    fn from(p: &PathBuf) -> Self {
        InputSource::Path(p.clone())
    }
}

impl From<&str> for InputSource {
    fn from(p: &str) -> Self {
        InputSource::Path(PathBuf::from(p))
    }
}

/// The bytes the parser reads.
pub enum ByteSource {
    #[cfg(feature = "memory-map")]
    Mapped(io::Cursor<memmap2::Mmap>),
    Buffered(Box<dyn BufRead + Send>),
}

impl ByteSource {
    /// Open `input`. With `memory_map`, an uncompressed, non-empty regular
    /// file is mapped; anything that cannot be mapped falls back to buffered
    /// reads without error.
    pub fn open(input: InputSource, memory_map: bool) -> Result<Self> {
        match input {
            InputSource::Reader { name, reader } => Ok(ByteSource::Buffered(
                auto_detect_reader(reader, &name)?,
            )),
            InputSource::Path(path) => {
                let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
                if memory_map && detect_from_extension(&path).is_none() {
                    #[cfg(feature = "memory-map")]
                    {
                        match map_file(&file, &path) {
                            Ok(Some(src)) => return Ok(src),
                            Ok(None) => {}
                            Err(e) => {
                                tracing::debug!(path = %path.display(), error = %e, "mmap unavailable, using buffered reads");
                            }
                        }
                    }
                }
                Ok(ByteSource::Buffered(auto_detect_reader(file, &path)?))
            }
        }
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        match self {
            #[cfg(feature = "memory-map")]
            ByteSource::Mapped(_) => true,
            ByteSource::Buffered(_) => false,
        }
    }
}

/// Map `file`. `Ok(None)` means mapping was declined (empty file); a
/// compressed payload is returned as a decompressing buffered source.
#[cfg(feature = "memory-map")]
fn map_file(file: &File, path: &Path) -> io::Result<Option<ByteSource>> {
    use crate::io::compression::detect_from_magic;
    use memmap2::Mmap;

    if file.metadata()?.len() == 0 {
        tracing::debug!(path = %path.display(), "empty file, skipping mmap");
        return Ok(None);
    }
    // SAFETY: the map is read-only and the file is not modified while the
    // job runs; concurrent truncation by another process is not supported.
    let mmap = unsafe { Mmap::map(file)? };
    if let Some(codec) = detect_from_magic(&mmap[..]) {
        tracing::debug!(path = %path.display(), codec = codec.name(), "compressed payload behind mmap");
        let inner = codec.wrap_reader_dyn(Box::new(io::Cursor::new(mmap)))?;
        return Ok(Some(ByteSource::Buffered(Box::new(io::BufReader::new(inner)))));
    }
    tracing::debug!(path = %path.display(), bytes = mmap.len(), "memory-mapped input");
    Ok(Some(ByteSource::Mapped(io::Cursor::new(mmap))))
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(feature = "memory-map")]
            ByteSource::Mapped(c) => c.read(buf),
            ByteSource::Buffered(r) => r.read(buf),
        }
    }
}

impl BufRead for ByteSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            #[cfg(feature = "memory-map")]
            ByteSource::Mapped(c) => c.fill_buf(),
            ByteSource::Buffered(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            #[cfg(feature = "memory-map")]
            ByteSource::Mapped(c) => c.consume(amt),
            ByteSource::Buffered(r) => r.consume(amt),
        }
    }
}

/// Groups parsed records into sequence-tagged [`RawBatch`]es.
///
/// A parse error in the middle of a chunk first yields the records read
/// before it as a (short) batch, then the error, then ends.
pub struct ChunkedSource<R> {
    reader: ArffReader<R>,
    chunk_size: usize,
    next_seq: u64,
    rows_emitted: u64,
    pending_error: Option<ArffError>,
    done: bool,
}

impl<R: BufRead> ChunkedSource<R> {
    /// Parse the header of `input`. `chunk_size` is clamped to at least 1.
    pub fn new(input: R, options: ParseOptions, chunk_size: usize) -> ArffResult<Self> {
        Ok(Self::from_reader(ArffReader::new(input, options)?, chunk_size))
    }

    pub fn from_reader(reader: ArffReader<R>, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            next_seq: 0,
            rows_emitted: 0,
            pending_error: None,
            done: false,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<DocumentSchema> {
        self.reader.schema()
    }

    /// Rows handed out so far.
    #[must_use]
    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    fn emit(&mut self, records: Vec<crate::parser::Record>) -> RawBatch {
        let batch = RawBatch {
            seq: self.next_seq,
            first_row: self.rows_emitted,
            records,
        };
        self.next_seq += 1;
        self.rows_emitted += batch.len() as u64;
        batch
    }
}

impl ChunkedSource<ByteSource> {
    /// Open `input` and parse its header.
    pub fn open(
        input: InputSource,
        memory_map: bool,
        options: ParseOptions,
        chunk_size: usize,
    ) -> Result<Self> {
        let name = input.name();
        let bytes = ByteSource::open(input, memory_map)?;
        let reader = ArffReader::new(bytes, options)
            .with_context(|| format!("read ARFF header of {name}"))?;
        Ok(Self::from_reader(reader, chunk_size))
    }
}

impl<R: BufRead> Iterator for ChunkedSource<R> {
    type Item = ArffResult<RawBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }
        let mut records = Vec::with_capacity(self.chunk_size.min(4096));
        while records.len() < self.chunk_size {
            match self.reader.next_record() {
                Ok(Some(rec)) => records.push(rec),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    if records.is_empty() {
                        return Some(Err(e));
                    }
                    self.pending_error = Some(e);
                    break;
                }
            }
        }
        if records.is_empty() {
            return None;
        }
        Some(Ok(self.emit(records)))
    }
}
