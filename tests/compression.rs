#![cfg(feature = "io-csv")]

use arffbeam::io::compression::{
    CompressionCodec, DynRead, DynWrite, FinishWrite, detect_from_magic, register_codec,
    strip_compression_suffix,
};
use arffbeam::testing::*;
use arffbeam::{ByteSource, InputSource, TargetFormat};
use std::sync::Arc;

fn expected_csv(ws: &TestWorkspace) -> anyhow::Result<String> {
    let input = ws.write("reference/weather.arff", WEATHER_ARFF)?;
    let result = ws.convert(&input, TargetFormat::csv(), |b| b.output(ws.file("reference/weather.csv")))?;
    ws.read_string(&result.output)
}

fn check_codec(extension: &str) -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let expected = expected_csv(&ws)?;
    let input = ws.write(&format!("weather.arff{extension}"), WEATHER_ARFF)?;

    for memory_map in [true, false] {
        let out = ws.file(&format!("weather-{memory_map}.csv"));
        let result = ws.convert(&input, TargetFormat::csv(), |b| b.memory_map(memory_map).output(&out))?;
        assert_eq!(result.rows, 14);
        assert_eq!(ws.read_string(&out)?, expected, "{extension}, memory_map = {memory_map}");
    }

    // Output name drops both the codec and the .arff extension.
    let derived = ws.convert(&input, TargetFormat::csv(), |b| b)?;
    assert_eq!(derived.output, ws.file("weather.csv"));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_input() -> anyhow::Result<()> {
    check_codec(".gz")
}

#[cfg(feature = "compression-zstd")]
#[test]
fn zstd_input() -> anyhow::Result<()> {
    check_codec(".zst")
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn bzip2_input() -> anyhow::Result<()> {
    check_codec(".bz2")
}

#[cfg(feature = "compression-xz")]
#[test]
fn xz_input() -> anyhow::Result<()> {
    check_codec(".xz")
}

#[cfg(feature = "compression-gzip")]
#[test]
fn compressed_payload_is_detected_without_extension() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let expected = expected_csv(&ws)?;
    let gz = ws.write("weather.arff.gz", WEATHER_ARFF)?;
    let disguised = ws.file("disguised.arff");
    std::fs::rename(&gz, &disguised)?;

    assert!(detect_from_magic(&std::fs::read(&disguised)?).is_some());
    for memory_map in [true, false] {
        let result = ws.convert(&disguised, TargetFormat::csv(), |b| b.memory_map(memory_map))?;
        assert_eq!(ws.read_string(&result.output)?, expected);
    }
    Ok(())
}

#[cfg(feature = "memory-map")]
#[test]
fn plain_files_are_memory_mapped_unless_asked_not_to() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("weather.arff", WEATHER_ARFF)?;
    let empty = ws.write("empty.arff", "")?;

    assert!(ByteSource::open(InputSource::from(&input), true)?.is_mapped());
    assert!(!ByteSource::open(InputSource::from(&input), false)?.is_mapped());
    // Empty files cannot be mapped; the fallback is silent.
    assert!(!ByteSource::open(InputSource::from(&empty), true)?.is_mapped());
    Ok(())
}

#[test]
fn custom_codec_is_used_for_reading_and_naming() -> anyhow::Result<()> {
    use std::io::{Read, Write};

    /// Stores bytes with every bit flipped.
    struct FlipCodec;

    struct Flip<T>(T);

    impl<R: Read> Read for Flip<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.0.read(buf)?;
            buf[..n].iter_mut().for_each(|b| *b = !*b);
            Ok(n)
        }
    }

    impl<W: Write> Write for Flip<W> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let flipped: Vec<u8> = buf.iter().map(|b| !b).collect();
            self.0.write_all(&flipped)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }

    impl FinishWrite for Flip<DynWrite> {
        fn finish(self: Box<Self>) -> std::io::Result<()> {
            self.0.finish()
        }
    }

    impl CompressionCodec for FlipCodec {
        fn name(&self) -> &str {
            "flip"
        }

        fn extensions(&self) -> &[&str] {
            &[".flip"]
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
            Ok(Box::new(Flip(reader)))
        }

        fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
            Ok(Box::new(Flip(writer)))
        }
    }

    register_codec(Arc::new(FlipCodec));
    assert_eq!(strip_compression_suffix("weather.arff.flip"), "weather.arff");

    let ws = TestWorkspace::new()?;
    let input = ws.write("scenario.arff.flip", SCENARIO_ARFF)?;
    assert_ne!(std::fs::read(&input)?, SCENARIO_ARFF.as_bytes());

    let result = ws.convert(&input, TargetFormat::csv(), |b| b)?;
    assert_eq!(result.output, ws.file("scenario.csv"));
    assert_eq!(ws.read_string(&result.output)?, "a,b\n1.5,X\n,Y\n");
    Ok(())
}

#[test]
fn failure_to_finish_compressed_output_fails_the_job() -> anyhow::Result<()> {
    use std::io::Write;

    /// Accepts every byte, then cannot write its trailer.
    struct NoTrailerCodec;

    struct NoTrailer(DynWrite);

    impl Write for NoTrailer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }

    impl FinishWrite for NoTrailer {
        fn finish(self: Box<Self>) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left for trailer"))
        }
    }

    impl CompressionCodec for NoTrailerCodec {
        fn name(&self) -> &str {
            "no-trailer"
        }

        fn extensions(&self) -> &[&str] {
            &[".notrailer"]
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader_dyn(&self, reader: DynRead) -> std::io::Result<DynRead> {
            Ok(reader)
        }

        fn wrap_writer_dyn(&self, writer: DynWrite) -> std::io::Result<DynWrite> {
            Ok(Box::new(NoTrailer(writer)))
        }
    }

    register_codec(Arc::new(NoTrailerCodec));

    let ws = TestWorkspace::new()?;
    let input = ws.write("test.arff", SCENARIO_ARFF)?;
    let out = ws.file("test.csv.notrailer");
    let err = ws
        .convert(&input, TargetFormat::csv(), |b| b.output(&out))
        .unwrap_err();
    assert!(format!("{err:#}").contains("no space left for trailer"), "{err:#}");
    assert!(!out.exists());
    assert!(!ws.file("test.csv.notrailer.partial").exists());
    Ok(())
}
