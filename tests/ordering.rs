//! Parallel runs must produce the same artifact as sequential runs.

use arffbeam::testing::*;
use arffbeam::{JsonLayout, TargetFormat};

fn enabled_formats() -> Vec<TargetFormat> {
    [
        TargetFormat::csv(),
        TargetFormat::Csv { delimiter: b'\t' },
        TargetFormat::Json(JsonLayout::Array),
        TargetFormat::Json(JsonLayout::Lines),
        TargetFormat::Xml,
        TargetFormat::Xlsx,
        TargetFormat::Parquet,
        TargetFormat::ArrowIpc,
    ]
    .into_iter()
    .filter(TargetFormat::is_enabled)
    .collect()
}

#[test]
fn parallel_output_matches_sequential_for_every_format() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("generated.arff", generated_arff(1_000))?;

    for format in enabled_formats() {
        for chunk_size in [1, 7, 500] {
            let name = |mode: &str| format!("{}-{chunk_size}-{mode}.{}", format.name(), format.extension());
            let seq = ws.convert(&input, format, |b| b.chunk_size(chunk_size).output(ws.file(&name("seq"))))?;
            let par = ws.convert(&input, format, |b| {
                b.chunk_size(chunk_size)
                    .parallel(true)
                    .workers(4)
                    .output(ws.file(&name("par")))
            })?;
            assert_eq!(seq.rows, 1_000, "{format} chunk {chunk_size}");
            assert_eq!(par.rows, seq.rows, "{format} chunk {chunk_size}");
            assert_eq!(par.batches, seq.batches, "{format} chunk {chunk_size}");
            assert_eq!(par.batches, 1_000_u64.div_ceil(chunk_size as u64));
            assert_same_bytes(&seq.output, &par.output);
        }
    }
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn fast_mode_warnings_keep_source_order_in_parallel() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let mut doc = String::from("@relation w\n@attribute c {a,b}\n@data\n");
    for i in 0..400 {
        doc.push_str(if i % 3 == 0 { "zz\n" } else { "a\n" });
    }
    let input = ws.write("warn.arff", doc)?;

    let seq = ws.convert(&input, TargetFormat::csv(), |b| {
        b.fast_mode(true).chunk_size(5).output(ws.file("seq.csv"))
    })?;
    let par = ws.convert(&input, TargetFormat::csv(), |b| {
        b.fast_mode(true)
            .chunk_size(5)
            .parallel(true)
            .workers(8)
            .output(ws.file("par.csv"))
    })?;

    assert_eq!(seq.warnings.len(), 134);
    assert_eq!(seq.warnings, par.warnings);
    let lines: Vec<usize> = par.warnings.iter().map(|w| w.line).collect();
    assert!(lines.windows(2).all(|w| w[0] < w[1]));
    assert_same_bytes(&seq.output, &par.output);
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn first_error_in_source_order_wins_in_parallel() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let mut doc = String::from("@relation e\n@attribute c {a,b}\n@attribute n numeric\n@data\n");
    for i in 0..300 {
        match i {
            120 => doc.push_str("q,1\n"),
            250 => doc.push_str("a,oops\n"),
            _ => doc.push_str("b,2\n"),
        }
    }
    let input = ws.write("errors.arff", doc)?;

    for workers in [1, 3, 8] {
        let err = ws
            .convert(&input, TargetFormat::csv(), |b| b.chunk_size(4).parallel(true).workers(workers))
            .unwrap_err();
        let typed = assert_arff_error(&err, arffbeam::ErrorKind::Domain);
        // Header is four lines; data row 120 is line 125.
        assert_eq!(typed.line(), Some(125), "workers = {workers}");
    }
    Ok(())
}

#[cfg(all(feature = "metrics", feature = "io-json"))]
#[test]
fn metrics_are_recorded_for_parallel_jobs() -> anyhow::Result<()> {
    use arffbeam::metrics::{BATCHES_WRITTEN, OUTPUT_BYTES, ROWS_WRITTEN, WARNINGS, MetricsCollector};

    let ws = TestWorkspace::new()?;
    let input = ws.write("weather.arff", WEATHER_ARFF)?;
    let metrics = MetricsCollector::new();
    let result = ws.convert(&input, TargetFormat::Json(JsonLayout::Lines), |b| {
        b.chunk_size(4).parallel(true).workers(3).metrics(metrics.clone())
    })?;

    assert_eq!(metrics.counter(ROWS_WRITTEN), Some(14));
    assert_eq!(metrics.counter(BATCHES_WRITTEN), Some(4));
    assert_eq!(metrics.counter(WARNINGS), Some(0));
    assert_eq!(metrics.counter(OUTPUT_BYTES), Some(result.output_bytes));
    assert!(metrics.elapsed().is_some());

    let saved = ws.file("metrics.json");
    metrics.save_to_file(&saved)?;
    let json: serde_json::Value = serde_json::from_str(&ws.read_string(&saved)?)?;
    assert_eq!(json["rows_written"]["value"], 14);
    Ok(())
}
