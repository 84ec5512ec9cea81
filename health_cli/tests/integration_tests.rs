//! Integration tests for the hkq binary.
//!
//! These tests drive the CLI end to end against fixture files:
//! - Identifier listing and registry inspection
//! - Saving samples and reading them back
//! - Statistics over a range
//! - Authorization round trips
//! - Identifier validation before the fixture is read

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a test directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI command isolated from the user's config directory
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hkq"));
    cmd.env("XDG_CONFIG_HOME", dir.join("config"))
        .env("XDG_DATA_HOME", dir.join("data"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_fixture(dir: &Path, fixture: serde_json::Value) -> PathBuf {
    let path = dir.join("fixture.json");
    fs::write(&path, serde_json::to_string_pretty(&fixture).unwrap()).unwrap();
    path
}

fn steps_fixture(dir: &Path) -> PathBuf {
    write_fixture(
        dir,
        serde_json::json!({
            "preferredUnits": {"HKQuantityTypeIdentifierStepCount": "count"},
            "quantitySamples": [
                {
                    "uuid": "6f1c2a4e-0000-4000-8000-000000000101",
                    "quantityType": "HKQuantityTypeIdentifierStepCount",
                    "quantity": 1200.0,
                    "unit": "count",
                    "startDate": "2024-01-01T08:00:00.000Z",
                    "endDate": "2024-01-01T09:00:00.000Z"
                },
                {
                    "uuid": "6f1c2a4e-0000-4000-8000-000000000102",
                    "quantityType": "HKQuantityTypeIdentifierStepCount",
                    "quantity": 800.0,
                    "unit": "count",
                    "startDate": "2024-01-01T12:00:00.000Z",
                    "endDate": "2024-01-01T13:00:00.000Z"
                }
            ]
        }),
    )
}

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("typed health client"));
}

#[test]
fn test_identifiers_by_kind() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .args(["identifiers", "--kind", "correlation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HKCorrelationTypeIdentifierBloodPressure"))
        .stdout(predicate::str::contains("HKQuantityTypeIdentifierStepCount").not());
}

#[test]
fn test_inspect_reports_unit_family() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .args(["inspect", "heartRate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"quantity\""))
        .stdout(predicate::str::contains("HKQuantityTypeIdentifierHeartRate"));
}

#[test]
fn test_unknown_identifier_fails_before_fixture_is_read() {
    let temp_dir = setup_test_dir();
    // A corrupt fixture would fail with a JSON error if it were read
    let fixture = temp_dir.path().join("fixture.json");
    fs::write(&fixture, "{ not json").unwrap();

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["last", "HKQuantityTypeIdentifierNotAThing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnknownIdentifier"));

    assert_eq!(fs::read_to_string(&fixture).unwrap(), "{ not json");
}

#[test]
fn test_last_lists_newest_first() {
    let temp_dir = setup_test_dir();
    let fixture = steps_fixture(temp_dir.path());

    let output = cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["last", "stepCount", "--limit", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("800 count"));
}

#[test]
fn test_between_filters_range() {
    let temp_dir = setup_test_dir();
    let fixture = steps_fixture(temp_dir.path());

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args([
            "between",
            "stepCount",
            "--from",
            "2024-01-01T07:00:00Z",
            "--to",
            "2024-01-01T10:00:00Z",
            "--unit",
            "count",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1200 count"))
        .stdout(predicate::str::contains("800 count").not());
}

#[test]
fn test_stats_reports_sum_and_most_recent_interval() {
    let temp_dir = setup_test_dir();
    let fixture = steps_fixture(temp_dir.path());

    let output = cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args([
            "stats",
            "stepCount",
            "--from",
            "2024-01-01T00:00:00Z",
            "--to",
            "2024-01-02T00:00:00Z",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stats: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(stats["sumQuantity"]["quantity"], 2000.0);
    assert_eq!(stats["mostRecentQuantity"]["quantity"], 800.0);
    assert_eq!(
        stats["mostRecentQuantityDateInterval"]["from"],
        "2024-01-01T12:00:00Z"
    );
}

#[test]
fn test_save_persists_to_fixture() {
    let temp_dir = setup_test_dir();
    let fixture = steps_fixture(temp_dir.path());

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args([
            "save",
            "stepCount",
            "500",
            "--start",
            "2024-01-02T08:00:00Z",
            "--end",
            "2024-01-02T08:30:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved stepCount"));

    let stored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&fixture).unwrap()).unwrap();
    assert_eq!(stored["quantitySamples"].as_array().unwrap().len(), 3);

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["last", "stepCount", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("500 count"));
}

#[test]
fn test_save_category_by_value_name() {
    let temp_dir = setup_test_dir();
    let fixture = temp_dir.path().join("fresh.json");

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args([
            "save",
            "sleepAnalysis",
            "asleepREM",
            "--start",
            "2024-01-01T01:00:00Z",
            "--end",
            "2024-01-01T02:00:00Z",
        ])
        .assert()
        .success();

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["last", "sleepAnalysis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("asleepREM"));
}

#[test]
fn test_strict_mode_rejects_wrong_unit() {
    let temp_dir = setup_test_dir();
    let fixture = steps_fixture(temp_dir.path());

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["--strict", "save", "stepCount", "10", "--unit", "kg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnitMismatch"));
}

#[test]
fn test_request_auth_then_status() {
    let temp_dir = setup_test_dir();
    let fixture = temp_dir.path().join("auth.json");

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["auth-status", "bodyMass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not authorized"));

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["request-auth", "--read", "stepCount", "--write", "bodyMass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("granted"));

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .args(["auth-status", "bodyMass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HKQuantityTypeIdentifierBodyMass: authorized"));
}

#[test]
fn test_characteristics_from_fixture() {
    let temp_dir = setup_test_dir();
    let fixture = write_fixture(
        temp_dir.path(),
        serde_json::json!({
            "characteristics": {"bloodType": 7, "dateOfBirth": "1990-05-17T00:00:00.000Z"}
        }),
    );

    cli(temp_dir.path())
        .arg("--fixture")
        .arg(&fixture)
        .arg("characteristics")
        .assert()
        .success()
        .stdout(predicate::str::contains("OPositive"))
        .stdout(predicate::str::contains("1990-05-17T00:00:00.000Z"));
}
