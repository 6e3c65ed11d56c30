//! Integration tests for pipeline specs
//!
//! These tests run pipelines end to end on fixture files, including specs
//! recorded from sheet edits.

use eruo::io::read_file;
use eruo::pipeline::{PipelineSpec, Step, run_pipeline};
use eruo::sheet::{Filter, SheetDocument, SortKey};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect()
}

#[test]
fn test_run_fixture_spec() {
    let spec = PipelineSpec::from_file("testdata/sales_pipeline.json").unwrap();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("sales.parquet");

    let report = run_pipeline(&spec, PathBuf::from("testdata/sales.csv"), Some(&output)).unwrap();

    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.steps_applied, 8);
    assert_eq!((report.rows_before, report.rows_after), (6, 4));
    assert_eq!((report.columns_before, report.columns_after), (5, 5));
    assert!(report.summary().starts_with("Pipeline completed: removed rows (6 → 4)"));

    let df = read_file(&output).unwrap();
    let totals: Vec<Option<f64>> = df.column("Total").unwrap().f64().unwrap().into_iter().collect();
    assert_eq!(totals, [Some(8.0), Some(7.5), Some(6.0), Some(4.5)]);
    assert_eq!(
        strings(&df, "product"),
        [Some("pear"), Some("apple"), Some("plum"), Some("apple")].map(|v| v.map(str::to_owned))
    );
}

#[test]
fn test_invalid_spec_is_rejected_before_running() {
    let mut spec = PipelineSpec::from_file("testdata/sales_pipeline.json").unwrap();
    spec.steps.push(Step::DropColumns {
        columns: vec!["discount".to_owned()],
    });
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("never.csv");

    let err = run_pipeline(&spec, Path::new("testdata/sales.csv"), Some(&output)).unwrap_err();

    assert!(err.to_string().contains("Step 9: Cannot drop non-existent column 'discount'"));
    assert!(!output.exists());
}

#[test]
fn test_recorded_history_replays_on_file() {
    let frame = read_file(Path::new("testdata/sales.csv")).unwrap();
    let mut doc = SheetDocument::new("Sales", frame);
    assert!(doc.apply_measure("Total = [qty] * [price]", 0).unwrap());
    assert!(doc
        .filter_rows(vec![Filter::not_equals("region", Some("east".to_owned()))])
        .unwrap());
    assert!(doc.sort_rows(vec![SortKey::new("price", true)], 0).unwrap());
    assert!(doc.hide_columns(0, 1).unwrap());

    let spec = PipelineSpec::from_history("recorded", doc.history(), doc.separator());
    let ops: Vec<&str> = spec.steps.iter().map(Step::name).collect();
    assert_eq!(ops, ["measure", "filter_rows", "sort_rows"]);

    let dir = TempDir::new().unwrap();
    let spec_path = dir.path().join("recorded.json");
    spec.to_file(&spec_path).unwrap();
    let output = dir.path().join("recorded.csv");
    let report = run_pipeline(
        &PipelineSpec::from_file(&spec_path).unwrap(),
        Path::new("testdata/sales.csv"),
        Some(&output),
    )
    .unwrap();

    let replayed = read_file(&output).unwrap();
    let visible = doc.visible_frame().unwrap();
    assert_eq!(report.rows_after, visible.height());
    assert_eq!(strings(&replayed, "product"), strings(&visible, "product"));
}

#[test]
fn test_reset_filters_drops_recorded_filter() {
    let frame = read_file(Path::new("testdata/sales.csv")).unwrap();
    let mut doc = SheetDocument::new("Sales", frame);
    doc.filter_rows(vec![Filter::equals("region", Some("north".to_owned()))])
        .unwrap();
    doc.reset_filters().unwrap();
    doc.apply_measure("Double = [price] * 2", 0).unwrap();

    let spec = PipelineSpec::from_history("reset", doc.history(), doc.separator());
    assert_eq!(
        spec.steps,
        [Step::Measure {
            expression: "Double = [price] * 2".to_owned()
        }]
    );
}
