//! Pluggable compression for ARFF inputs and text outputs.
//!
//! Compressed inputs (`data.arff.gz`, `data.arff.zst`, ...) are detected by
//! extension first and by magic bytes second, then decompressed on the fly
//! while the parser streams them. Text writers (CSV, JSON, XML) use the same
//! registry on the destination path, so `out.csv.gz` comes out gzip-encoded.
//! Binary containers (xlsx, parquet, arrow) carry their own compression and
//! never go through this module.
//!
//! ## Built-in codecs
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature: `compression-xz`)
//!
//! ```no_run
//! use arffbeam::io::compression::auto_detect_reader;
//! use std::fs::File;
//! # fn main() -> anyhow::Result<()> {
//! let file = File::open("weather.arff.gz")?;
//! let reader = auto_detect_reader(file, "weather.arff.gz")?;
//! # Ok(())
//! # }
//! ```
//!
//! Writers are finished explicitly with [`FinishWrite::finish`]; dropping a
//! compressed writer would lose the error from writing its trailer.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, IntoInnerError, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// A boxed reader that can move to the parser thread.
pub type DynRead = Box<dyn Read + Send>;
/// A boxed writer that can move with its format writer.
pub type DynWrite = Box<dyn FinishWrite>;

/// A writer with an explicit end of stream.
pub trait FinishWrite: Write + Send {
    /// Write any trailer, flush, and report the first error on the way down
    /// to the file.
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

impl<W: Write + Send> FinishWrite for BufWriter<W> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        let mut inner = (*self).into_inner().map_err(IntoInnerError::into_error)?;
        inner.flush()
    }
}

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec alongside the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A compression algorithm, detected by extension or magic bytes.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lower-case extensions including the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead>;

    fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite>;
}

/// Codec whose extension ends `path`, matched case-insensitively.
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    get_registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Codec whose magic signature prefixes `head`.
pub fn detect_from_magic(head: &[u8]) -> Option<Arc<dyn CompressionCodec>> {
    if head.is_empty() {
        return None;
    }
    get_registry().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| head.len() >= magic.len() && head.starts_with(magic))
    })
}

/// `file_name` without a recognized compression extension
/// (`weather.arff.gz` → `weather.arff`).
#[must_use]
pub fn strip_compression_suffix(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for codec in get_registry() {
        for ext in codec.extensions() {
            if lower.len() > ext.len() && lower.ends_with(ext) {
                return &file_name[..file_name.len() - ext.len()];
            }
        }
    }
    file_name
}

/// Wrap `reader` with a decompressor when `path_hint` or the stream's first
/// bytes identify a codec. The result is always buffered.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn BufRead + Send>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        let inner = codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
        return Ok(Box::new(BufReader::new(inner)));
    }

    let mut buf_reader = BufReader::new(reader);
    let head = buf_reader.fill_buf().context("peek input header")?;
    if let Some(codec) = detect_from_magic(head) {
        let inner = codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
        return Ok(Box::new(BufReader::new(inner)));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap `writer` with a compressor chosen by the extension of `path_hint`.
/// Uncompressed output is buffered.
pub fn auto_detect_writer<W: Write + Send + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<DynWrite> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_writer_dyn(Box::new(BufWriter::new(writer)))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
        // Multi-member streams are common for concatenated .arff.gz files.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-gzip")]
impl FinishWrite for flate2::write::GzEncoder<DynWrite> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.finish()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as DynRead)
    }

    fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as DynWrite)
    }
}

#[cfg(feature = "compression-zstd")]
impl FinishWrite for zstd::stream::write::Encoder<'static, DynWrite> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.finish()
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-bzip2")]
impl FinishWrite for bzip2::write::BzEncoder<DynWrite> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.finish()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}

#[cfg(feature = "compression-xz")]
impl FinishWrite for xz2::write::XzEncoder<DynWrite> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.finish()
    }
}
