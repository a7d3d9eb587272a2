use arffbeam::testing::*;
use arffbeam::{JsonLayout, TargetFormat};

#[cfg(feature = "io-json")]
#[test]
fn json_array_layout_uses_null_for_missing() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("test.arff", SCENARIO_ARFF)?;
    let result = ws.convert(&input, TargetFormat::Json(JsonLayout::Array), |b| b.chunk_size(1))?;

    let text = ws.read_string(&result.output)?;
    assert_eq!(text, "[\n{\"a\":1.5,\"b\":\"X\"},\n{\"a\":null,\"b\":\"Y\"}\n]\n");
    let parsed: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    Ok(())
}

#[cfg(feature = "io-json")]
#[test]
fn json_array_of_empty_document_is_valid() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("empty.arff", "@relation e\n@attribute a numeric\n@data\n")?;
    let result = ws.convert(&input, TargetFormat::Json(JsonLayout::Array), |b| b)?;
    let parsed: serde_json::Value = serde_json::from_str(&ws.read_string(&result.output)?)?;
    assert_eq!(parsed, serde_json::json!([]));
    Ok(())
}

#[cfg(feature = "io-json")]
#[test]
fn json_lines_keep_types() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("events.arff", EVENTS_ARFF)?;
    let result = ws.convert(&input, "jsonl".parse()?, |b| b)?;
    assert_eq!(result.output, ws.file("events.jsonl"));

    let rows: Vec<serde_json::Value> = ws
        .read_string(&result.output)?
        .lines()
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["at"], "2024-03-01 08:15:00");
    assert_eq!(rows[1]["latency"], 1250);
    assert_eq!(rows[2]["at"], serde_json::Value::Null);
    assert_eq!(rows[3]["message"], "line\nbreak");
    assert_eq!(rows[3]["latency"], 2000.0);
    Ok(())
}

#[cfg(feature = "io-xml")]
#[test]
fn xml_wraps_records_in_the_relation() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("test.arff", SCENARIO_ARFF)?;
    let result = ws.convert(&input, TargetFormat::Xml, |b| b)?;
    assert_eq!(
        ws.read_string(&result.output)?,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <test>\n\
         \x20 <record>\n\
         \x20   <a>1.5</a>\n\
         \x20   <b>X</b>\n\
         \x20 </record>\n\
         \x20 <record>\n\
         \x20   <a/>\n\
         \x20   <b>Y</b>\n\
         \x20 </record>\n\
         </test>\n"
    );
    Ok(())
}

#[cfg(feature = "io-xml")]
#[test]
fn xml_escapes_text_and_sanitizes_names() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("events.arff", EVENTS_ARFF)?;
    let options = arffbeam::WriterOptions {
        record_element: "event".into(),
        ..Default::default()
    };
    let result = ws.convert(&input, TargetFormat::Xml, |b| b.writer_options(options))?;
    let text = ws.read_string(&result.output)?;
    assert!(text.contains("<server_events>"));
    assert!(text.contains("<event>"));
    assert!(text.contains("&lt;again&gt;</message>"), "{text}");
    assert!(text.contains("<at/>"));
    Ok(())
}

#[cfg(feature = "io-xlsx")]
#[test]
fn xlsx_holds_one_sheet_with_header_and_rows() -> anyhow::Result<()> {
    use std::io::Read;

    let ws = TestWorkspace::new()?;
    let input = ws.write("weather.arff", WEATHER_ARFF)?;
    let result = ws.convert(&input, TargetFormat::Xlsx, |b| b.chunk_size(4).parallel(true).workers(2))?;

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&result.output)?)?;
    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();
    for part in ["[Content_Types].xml", "xl/workbook.xml", "xl/worksheets/sheet1.xml"] {
        assert!(names.iter().any(|n| n == part), "missing {part}: {names:?}");
    }

    let mut workbook = String::new();
    archive.by_name("xl/workbook.xml")?.read_to_string(&mut workbook)?;
    assert!(workbook.contains(r#"<sheet name="Data""#));

    let mut sheet = String::new();
    archive.by_name("xl/worksheets/sheet1.xml")?.read_to_string(&mut sheet)?;
    assert!(sheet.contains(r#"<dimension ref="A1:E15"/>"#));
    assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t>outlook</t></is></c>"#));
    assert!(sheet.contains(r#"<c r="B2"><v>85</v></c>"#));
    // Missing humidity on the 13th data row leaves no C14 cell.
    assert!(!sheet.contains(r#"r="C14""#));
    assert_eq!(sheet.matches("<row ").count(), 15);
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn tsv_uses_tabs_and_its_own_extension() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("mixed.arff", MIXED_DENSE_ARFF)?;
    let result = ws.convert(&input, "tsv".parse()?, |b| b)?;
    assert_eq!(result.output, ws.file("mixed.tsv"));
    assert_lines(
        &result.output,
        &["x\tn\tlabel\tnote", "0\t0\tlow\t", "3.25\t\t\thello, world", "\t7\thigh\t", "\t\t\t"],
    );
    Ok(())
}

/// Rebuild an ARFF document from `header` and a CSV body: empty fields
/// become `?`, everything else is single-quoted with backslash escapes.
#[cfg(feature = "io-csv")]
fn csv_to_arff(header: &str, csv_text: &str) -> anyhow::Result<String> {
    let mut out = String::from(header);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());
    for record in reader.records() {
        let fields: Vec<String> = record?
            .iter()
            .map(|f| {
                if f.is_empty() {
                    "?".to_string()
                } else {
                    format!("'{}'", f.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
                }
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    Ok(out)
}

#[cfg(feature = "io-csv")]
#[test]
fn csv_conversion_is_idempotent() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let generated = generated_arff(300);
    for (name, doc) in [("weather", WEATHER_ARFF), ("events", EVENTS_ARFF), ("generated", generated.as_str())] {
        let input = ws.write(&format!("{name}.arff"), doc)?;
        let first = ws.convert(&input, TargetFormat::csv(), |b| b.output(ws.file(&format!("{name}-1.csv"))))?;

        let header = doc.split_inclusive('\n').take_while(|l| !l.starts_with("@data")).collect::<String>() + "@data\n";
        let again = ws.write(&format!("{name}-again.arff"), csv_to_arff(&header, &ws.read_string(&first.output)?)?)?;
        let second = ws.convert(&again, TargetFormat::csv(), |b| b.output(ws.file(&format!("{name}-2.csv"))))?;

        assert_eq!(first.rows, second.rows);
        assert_same_bytes(&first.output, &second.output);
    }
    Ok(())
}

#[cfg(all(feature = "io-csv", feature = "compression-gzip"))]
#[test]
fn compressed_output_follows_the_extension() -> anyhow::Result<()> {
    use std::io::Read;

    let ws = TestWorkspace::new()?;
    let input = ws.write("test.arff", SCENARIO_ARFF)?;
    let result = ws.convert(&input, TargetFormat::csv(), |b| b.output(ws.file("test.csv.gz")))?;

    let mut text = String::new();
    flate2::read::GzDecoder::new(std::fs::File::open(&result.output)?).read_to_string(&mut text)?;
    assert_eq!(text, "a,b\n1.5,X\n,Y\n");
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn single_column_missing_values_are_empty_lines() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write("single.arff", "@relation single\n@attribute a numeric\n@data\n1\n?\n")?;
    for parallel in [false, true] {
        let out = ws.file(&format!("single-{parallel}.csv"));
        let result = ws.convert(&input, TargetFormat::csv(), |b| b.chunk_size(1).parallel(parallel).workers(2).output(&out))?;
        assert_eq!(result.rows, 2);
        assert_eq!(ws.read_string(&out)?, "a\n1\n\n");
    }
    Ok(())
}
