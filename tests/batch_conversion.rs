#![cfg(feature = "io-csv")]

use arffbeam::io::glob::expand_glob;
use arffbeam::testing::*;
use arffbeam::{BatchOptions, ErrorKind, TargetFormat, convert_glob, convert_many};

#[test]
fn glob_conversion_returns_results_in_path_order() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    ws.write("in/b_weather.arff", WEATHER_ARFF)?;
    ws.write("in/a_test.arff", SCENARIO_ARFF)?;
    ws.write("in/c_mixed.arff", MIXED_SPARSE_ARFF)?;
    ws.write("in/notes.txt", "not an arff file")?;
    let out_dir = ws.file("out");

    let pattern = format!("{}/in/*.arff", ws.path().display());
    let results = convert_glob(&pattern, &out_dir, TargetFormat::csv(), &BatchOptions::default())?;
    let rows: Vec<u64> = results
        .iter()
        .map(|r| r.as_ref().map(|c| c.rows).map_err(|e| anyhow::anyhow!("{e:#}")))
        .collect::<anyhow::Result<_>>()?;
    assert_eq!(rows, vec![2, 14, 4]);
    assert_lines(out_dir.join("a_test.csv"), &["a,b", "1.5,X", ",Y"]);
    assert!(out_dir.join("b_weather.csv").exists());
    assert!(out_dir.join("c_mixed.csv").exists());
    Ok(())
}

#[test]
fn one_bad_file_does_not_stop_the_batch() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let good = ws.write("good.arff", SCENARIO_ARFF)?;
    let bad = ws.write("bad.arff", SCENARIO_DOMAIN_VIOLATION_ARFF)?;
    let out_dir = ws.file("out");

    for parallel_files in [false, true] {
        let options = BatchOptions {
            parallel_files,
            parallel_batches: true,
            chunk_size: Some(1),
            ..BatchOptions::default()
        };
        let results = convert_many(&[bad.clone(), good.clone()], &out_dir, TargetFormat::csv(), &options);
        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert_arff_error(err, ErrorKind::Domain);
        assert_eq!(results[1].as_ref().map(|r| r.rows).ok(), Some(2));
        assert!(!out_dir.join("bad.csv").exists());
    }

    let fast = BatchOptions {
        fast_mode: true,
        ..BatchOptions::default()
    };
    let results = convert_many(&[bad], &out_dir, TargetFormat::csv(), &fast);
    assert_eq!(results[0].as_ref().map(|r| r.warnings.len()).ok(), Some(1));
    Ok(())
}

#[test]
fn colliding_output_names_are_rejected() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let first = ws.write("x/data.arff", SCENARIO_ARFF)?;
    let second = ws.write("y/data.arff", SCENARIO_ARFF)?;
    let out_dir = ws.file("out");

    let results = convert_many(&[first, second], &out_dir, TargetFormat::csv(), &BatchOptions::default());
    assert!(results[0].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert!(err.to_string().contains("would overwrite"), "{err}");
    Ok(())
}

#[test]
fn pattern_without_matches_is_an_error() -> anyhow::Result<()> {
    let ws = TestWorkspace::new()?;
    let pattern = format!("{}/*.arff", ws.path().display());
    assert!(expand_glob(&pattern)?.is_empty());
    assert!(convert_glob(&pattern, ws.path(), TargetFormat::csv(), &BatchOptions::default()).is_err());
    Ok(())
}
