mod common;

use std::fs;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::prelude::*;
use predicates::str::contains;

const PROFILE: &str = "target_table: staging_patient_encounters
key_column: encounter_id
success_ledger: import_encounter_logs
failure_ledger: import_encounter_failures
date_columns: [encounter_date]
datetime_columns: [updated_date]
";

fn stager() -> Command {
    Command::cargo_bin("csv-stager").expect("binary exists")
}

#[test]
fn ingest_with_profile_imports_and_reports() {
    let workspace = TestWorkspace::new();
    let profile = workspace.write("encounters.yml", PROFILE);
    workspace.write_source(
        "a.csv",
        "encounter_id,patient_name,encounter_date,updated_date\n1,Alice,2024-01-05,\n2,Bob,,\n",
    );
    workspace.write_source("notes.txt", "ignored");
    let report = workspace.path().join("report.json");

    stager()
        .args([
            "ingest",
            "-s",
            workspace.source_dir().to_str().unwrap(),
            "-d",
            workspace.database().to_str().unwrap(),
            "-p",
            profile.to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("a.csv"))
        .stdout(contains("All files imported successfully."));

    assert_eq!(workspace.count("staging_patient_encounters"), 2);
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("read report")).expect("parse report");
    assert_eq!(json["target_table"], "staging_patient_encounters");
    assert_eq!(json["files"][0]["file_name"], "a.csv");
    assert_eq!(json["files"][0]["status"], "succeeded");
    assert_eq!(json["files"][0]["rows"], 2);
}

#[test]
fn ingest_lists_failed_files_and_strict_mode_fails() {
    let workspace = TestWorkspace::new();
    let profile = workspace.write("encounters.yml", PROFILE);
    workspace.write_source("d.csv", "");
    let source = workspace.source_dir();
    let database = workspace.database();

    let args = [
        "ingest",
        "-s",
        source.to_str().unwrap(),
        "-d",
        database.to_str().unwrap(),
        "-p",
        profile.to_str().unwrap(),
    ];
    stager()
        .args(args)
        .assert()
        .success()
        .stdout(contains("The following files failed to import:"))
        .stdout(contains(" - d.csv"));

    stager()
        .args(args)
        .arg("--strict")
        .assert()
        .failure()
        .stderr(contains("1 file(s) failed to import"));
}

#[test]
fn ingest_flags_override_profile_free_defaults() {
    let workspace = TestWorkspace::new();
    workspace
        .connection()
        .execute_batch("CREATE TABLE staging_patient (case_id TEXT, date_of_birth TEXT, date_of_death TEXT);")
        .unwrap();
    workspace.write_source(
        "p.tsv",
        "case_id\tdate_of_birth\tdate_of_death\nP1\tbad\tbad\n",
    );

    stager()
        .args([
            "ingest",
            "-s",
            workspace.source_dir().to_str().unwrap(),
            "-d",
            workspace.database().to_str().unwrap(),
            "-t",
            "staging_patient",
            "-k",
            "case_id",
            "--extension",
            "tsv",
            "--date-column",
            "date_of_birth",
            "--nullable-date-column",
            "date_of_death",
        ])
        .assert()
        .success();

    let (birth, death): (String, Option<String>) = workspace
        .connection()
        .query_row(
            "SELECT date_of_birth, date_of_death FROM staging_patient",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(birth, "1900-01-01");
    assert_eq!(death, None);
    assert_eq!(workspace.ledger_files("imported_files_log"), vec!["p.tsv"]);
}

#[test]
fn ingest_requires_profile_or_table() {
    let workspace = TestWorkspace::new();
    stager()
        .args([
            "ingest",
            "-s",
            workspace.source_dir().to_str().unwrap(),
            "-d",
            workspace.database().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("Either --profile or --table must be provided"));
}

#[test]
fn ledger_command_shows_failures() {
    let workspace = TestWorkspace::new();
    let profile = workspace.write("encounters.yml", PROFILE);
    workspace.write_source("broken.csv", "encounter_id,patient_name\n1\n");
    stager()
        .args([
            "ingest",
            "-s",
            workspace.source_dir().to_str().unwrap(),
            "-d",
            workspace.database().to_str().unwrap(),
            "-p",
            profile.to_str().unwrap(),
        ])
        .assert()
        .success();

    stager()
        .args([
            "ledger",
            "-d",
            workspace.database().to_str().unwrap(),
            "-p",
            profile.to_str().unwrap(),
            "--failures",
        ])
        .assert()
        .success()
        .stdout(contains("error_message"))
        .stdout(contains("broken.csv"));

    stager()
        .args([
            "ledger",
            "-d",
            workspace.database().to_str().unwrap(),
            "--success-ledger",
            "import_encounter_logs",
            "--failure-ledger",
            "import_encounter_failures",
        ])
        .assert()
        .success()
        .stdout(contains("inserted_at"))
        .stdout(contains("broken.csv").not());
}

#[test]
fn ledger_command_does_not_create_missing_database() {
    let workspace = TestWorkspace::new();
    let missing = workspace.path().join("typo.sqlite");

    stager()
        .args(["ledger", "-d", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Opening database"));

    assert!(!missing.exists());
}

#[test]
fn ledger_command_reports_missing_ledger_table() {
    let workspace = TestWorkspace::new();

    stager()
        .args([
            "ledger",
            "-d",
            workspace.database().to_str().unwrap(),
            "--success-ledger",
            "never_created_log",
        ])
        .assert()
        .failure()
        .stderr(contains("Reading ledger 'never_created_log'"));

    let tables: i64 = workspace
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'never_created_log'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}
