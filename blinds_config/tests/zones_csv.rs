use blinds_config::{ZoneRow, load_zones_csv};
use rstest::rstest;
use std::fs;
use std::io::Write;
use tempfile::tempdir;

fn write_csv(lines: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zones.csv");
    let mut f = fs::File::create(&path).unwrap();
    for l in lines {
        writeln!(f, "{l}").unwrap();
    }
    (dir, path)
}

#[test]
fn loads_ordered_rows() {
    let (_dir, path) = write_csv(&[
        "threshold,current_ma,speed_rpm",
        "-179000,1500,30",
        "-80000, 1250, 30",
    ]);
    let rows = load_zones_csv(&path).expect("load");
    assert_eq!(
        rows,
        vec![
            ZoneRow {
                threshold: -179000,
                current_ma: 1500,
                speed_rpm: 30
            },
            ZoneRow {
                threshold: -80000,
                current_ma: 1250,
                speed_rpm: 30
            },
        ]
    );
}

#[rstest]
#[case(&["threshold,current,speed", "0,1,1"], "headers")]
#[case(&["threshold,current_ma,speed_rpm", "0,1,1", "-5,1,1"], "strictly ascending")]
#[case(&["threshold,current_ma,speed_rpm", "0,abc,1"], "invalid CSV row 2")]
#[case(&["threshold,current_ma,speed_rpm"], "at least one zone")]
#[case(&["threshold,current_ma,speed_rpm", "0,0,10"], "current_ma must be > 0")]
fn rejects_bad_tables(#[case] lines: &[&str], #[case] needle: &str) {
    let (_dir, path) = write_csv(lines);
    let err = load_zones_csv(&path).expect_err("should fail");
    assert!(
        err.to_string().contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn missing_file_reports_path() {
    let err = load_zones_csv(std::path::Path::new("/nonexistent/zones.csv")).unwrap_err();
    assert!(err.to_string().contains("open zone CSV"));
}
