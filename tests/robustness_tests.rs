use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_malformed_rows_are_reported_and_skipped() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "customer_id, total, items").unwrap();
    writeln!(csv, "good, 1.50, tea").unwrap();
    writeln!(csv, "bad, not-a-number, tea").unwrap();
    writeln!(csv, "zero, 0, tea").unwrap();
    writeln!(csv, "also-good, 2").unwrap();

    let mut cmd = Command::new(cargo_bin!("paydispatch"));
    cmd.arg(csv.path())
        .args(["--approval-rate", "1.0", "--latency-ms", "0"]);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading order"))
        .stderr(predicate::str::contains("Error submitting order"))
        .stdout(predicate::str::contains(",good,1.5,completed"))
        .stdout(predicate::str::contains(",also-good,2,completed"))
        .stdout(predicate::str::contains(",bad,").not())
        .stdout(predicate::str::contains(",zero,").not());
}

#[test]
fn test_empty_input_prints_nothing() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "customer_id, total, items").unwrap();

    let mut cmd = Command::new(cargo_bin!("paydispatch"));
    cmd.arg(csv.path());

    cmd.assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn test_many_orders_all_resolve() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "customer_id,total,items").unwrap();
    for i in 0..200 {
        writeln!(csv, "c{i},{}.25,item", i + 1).unwrap();
    }

    let mut cmd = Command::new(cargo_bin!("paydispatch"));
    cmd.arg(csv.path())
        .args(["--approval-rate", "0.5", "--latency-ms", "0..2", "--prefetch", "20"]);

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let rows: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(rows.len(), 200);
    assert!(
        rows.iter()
            .all(|row| row.ends_with(",completed") || row.ends_with(",failed"))
    );
}
