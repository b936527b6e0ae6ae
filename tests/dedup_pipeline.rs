use std::path::Path;

use sheet_sifter::config::{DedupConfig, SourceConfig};
use sheet_sifter::pipeline::{remove_duplicates, FILTERED_SHEET, REMOVED_SHEET};
use sheet_sifter::{load_table, save_table, CellValue, LoadOptions, SiftError, Table};

const KEY: &str = "NAME OF FACILITY";

fn facilities(name: &str, names: &[&str]) -> Table {
    Table::new(
        name,
        vec![KEY.into(), "County".into()],
        names
            .iter()
            .map(|n| vec![(*n).into(), "Kisumu".into()])
            .collect(),
    )
}

/// Write a workbook whose header sits below `preamble` title rows.
fn write_with_preamble(path: &Path, table: &Table, preamble: usize) {
    let mut rows: Vec<Vec<CellValue>> = (0..preamble)
        .map(|i| vec![format!("Report line {i}").into(), CellValue::Null])
        .collect();
    rows.push(table.columns().iter().map(|c| c.as_str().into()).collect());
    rows.extend(table.rows().iter().cloned());
    let sheet = Table::new(table.name(), vec!["".into(), "".into()], rows);
    // The placeholder header row lands at row 0, so the real header is at
    // row `preamble + 1`.
    save_table(&sheet, path, None).unwrap();
}

fn config(dir: &Path) -> DedupConfig {
    DedupConfig {
        primary: SourceConfig::new(dir.join("responses.csv"), 0),
        references: vec![
            SourceConfig::new(dir.join("registry.xlsx"), 3),
            SourceConfig::new(dir.join("surveillance.xlsx"), 13),
        ],
        key_column: KEY.into(),
        threshold: 75,
        removed_output: dir.join("removed_facilities.xlsx"),
        filtered_output: None,
    }
}

fn seed(dir: &Path) {
    save_table(
        &facilities(
            "responses",
            &["ABC Hospital", "Central Clinic", "St Mary Hospitl", "Kisumu Clinic"],
        ),
        &dir.join("responses.csv"),
        None,
    )
    .unwrap();
    write_with_preamble(
        &dir.join("registry.xlsx"),
        &facilities("registry", &["abc hospital ", "North Clinic"]),
        2,
    );
    write_with_preamble(
        &dir.join("surveillance.xlsx"),
        &facilities("surveillance", &["Hospital St Mary"]),
        12,
    );
}

fn names(table: &Table) -> Vec<String> {
    table
        .column(KEY)
        .unwrap()
        .into_iter()
        .map(CellValue::to_string)
        .collect()
}

#[test]
fn removes_matches_and_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let config = config(dir.path());

    let run = remove_duplicates(&config).unwrap();

    assert_eq!(names(&run.partition.kept), vec!["Central Clinic", "Kisumu Clinic"]);
    assert_eq!(run.partition.matches.len(), 2);
    assert_eq!(run.partition.matches[0].matched_with, CellValue::from("abc hospital "));
    assert_eq!(run.partition.matches[1].reference_table, "surveillance.xlsx");

    let backup = load_table(&run.backup_path, &LoadOptions::default()).unwrap();
    assert_eq!(run.backup_path, dir.path().join("responses_backup.csv"));
    assert_eq!(backup.len(), 4);

    assert_eq!(run.filtered_path, dir.path().join("responses_filtered.xlsx"));
    let kept = load_table(
        &run.filtered_path,
        &LoadOptions {
            header_row: 0,
            sheet: Some(FILTERED_SHEET.into()),
        },
    )
    .unwrap();
    assert_eq!(names(&kept), vec!["Central Clinic", "Kisumu Clinic"]);

    let removed = load_table(
        &config.removed_output,
        &LoadOptions {
            header_row: 0,
            sheet: Some(REMOVED_SHEET.into()),
        },
    )
    .unwrap();
    assert_eq!(
        removed.column("Matched With").unwrap(),
        vec![&CellValue::from("abc hospital "), &CellValue::from("Hospital St Mary")]
    );

    let report = run.report(KEY).to_string();
    assert!(report.contains("- ABC Hospital (matched with: abc hospital )"));
    assert!(report.contains("Total removed: 2 similar NAME OF FACILITYs"));
}

#[test]
fn nothing_removed_means_no_removed_report() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let mut config = config(dir.path());
    config.threshold = 100;
    save_table(
        &facilities("responses", &["Central Clinic"]),
        &config.primary.path,
        None,
    )
    .unwrap();

    let run = remove_duplicates(&config).unwrap();
    assert!(run.removed_path.is_none());
    assert!(!config.removed_output.exists());
    assert_eq!(run.partition.kept.len(), 1);
}

#[test]
fn missing_reference_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    std::fs::remove_file(dir.path().join("surveillance.xlsx")).unwrap();
    let config = config(dir.path());

    let err = remove_duplicates(&config).unwrap_err();
    match err {
        SiftError::FileNotFound { path } => assert_eq!(path, dir.path().join("surveillance.xlsx")),
        other => panic!("expected FileNotFound, got {other:?}"),
    }
    assert!(!dir.path().join("responses_backup.csv").exists());
    assert!(!dir.path().join("responses_filtered.xlsx").exists());
}

#[test]
fn wrong_header_row_surfaces_as_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let mut config = config(dir.path());
    config.references[0].options.header_row = 0;

    let err = remove_duplicates(&config).unwrap_err();
    assert!(matches!(
        err,
        SiftError::ColumnNotFound { ref table, .. } if table == "registry.xlsx"
    ));
    assert!(!dir.path().join("responses_backup.csv").exists());
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let mut config = config(dir.path());
    config.threshold = 101;
    assert!(matches!(
        remove_duplicates(&config),
        Err(SiftError::InvalidThreshold(101))
    ));
}
