use std::fs::File;
use std::io::Write;

use ailoop_config::{PointRow, PointTable, load_points_csv};
use rstest::rstest;
use tempfile::tempdir;

fn full_rows() -> Vec<PointRow> {
    (4u8..=20)
        .map(|ma| PointRow {
            ma,
            code: 16_000 + u32::from(ma - 4) * 1_800,
        })
        .collect()
}

#[rstest]
fn table_is_indexed_by_milliamp() {
    let mut rows = full_rows();
    rows.reverse();
    let t = PointTable::from_rows(&rows).unwrap();
    assert_eq!(t.codes[0], 16_000);
    assert_eq!(t.codes[16], 16_000 + 16 * 1_800);
}

#[rstest]
fn missing_point_is_named() {
    let rows: Vec<_> = full_rows().into_iter().filter(|r| r.ma != 11).collect();
    let err = PointTable::from_rows(&rows).expect_err("11 mA missing");
    assert!(format!("{err}").contains("missing 11 mA"));
}

#[rstest]
fn duplicate_point_errors() {
    let mut rows = full_rows();
    rows.push(PointRow { ma: 7, code: 1 });
    let err = PointTable::from_rows(&rows).expect_err("duplicate");
    assert!(format!("{err}").to_lowercase().contains("duplicate point for 7 ma"));
}

#[rstest]
fn csv_round_trip_loads_all_points() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("points.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "ma,code").unwrap();
    for r in full_rows() {
        writeln!(f, "{}, {}", r.ma, r.code).unwrap();
    }
    drop(f);
    let t = load_points_csv(&path).unwrap();
    assert_eq!(t, PointTable::from_rows(&full_rows()).unwrap());
}

#[rstest]
fn csv_with_wrong_headers_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_headers.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "ma,raw").unwrap();
    writeln!(f, "4,16000").unwrap();

    let err = load_points_csv(&path).expect_err("should error on bad headers");
    assert!(format!("{err}").contains("headers 'ma,code'"));
}

#[rstest]
fn csv_with_non_numeric_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_numeric.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "ma,code").unwrap();
    writeln!(f, "four,xyz").unwrap();

    let err = load_points_csv(&path).expect_err("should error on non-numeric");
    assert!(format!("{err}").contains("invalid CSV row 2"));
}

#[rstest]
fn csv_missing_file_errors() {
    let dir = tempdir().unwrap();
    let err = load_points_csv(&dir.path().join("nope.csv")).expect_err("no file");
    assert!(format!("{err}").contains("open calibration CSV"));
}
