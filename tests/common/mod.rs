#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_stager::profile::TargetProfile;
use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

pub const STAGING_DDL: &str = "CREATE TABLE staging_patient_encounters (
    encounter_id INTEGER PRIMARY KEY,
    patient_name TEXT,
    encounter_date TEXT,
    updated_date TEXT
);";

/// Scratch source directory plus a database file, both removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates the workspace with an empty `source/` directory and a database
    /// that already holds the staging table.
    pub fn new() -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
        };
        fs::create_dir(workspace.source_dir()).expect("create source dir");
        let conn = Connection::open(workspace.database()).expect("open database");
        conn.execute_batch(STAGING_DDL).expect("create staging table");
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.temp_dir.path().join("source")
    }

    pub fn database(&self) -> PathBuf {
        self.temp_dir.path().join("staging.sqlite")
    }

    /// Writes a source file and returns its path.
    pub fn write_source(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.source_dir().join(name);
        fs::write(&path, contents).expect("write source file");
        path
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write file");
        path
    }

    pub fn connection(&self) -> Connection {
        Connection::open(self.database()).expect("open database")
    }

    pub fn count(&self, table: &str) -> i64 {
        self.connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    pub fn keys(&self) -> Vec<i64> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare("SELECT encounter_id FROM staging_patient_encounters ORDER BY encounter_id")
            .expect("prepare key query");
        stmt.query_map([], |row| row.get(0))
            .expect("query keys")
            .collect::<Result<Vec<i64>, _>>()
            .expect("read keys")
    }

    pub fn ledger_files(&self, table: &str) -> Vec<String> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(&format!("SELECT file_name FROM {table} ORDER BY file_name"))
            .expect("prepare ledger query");
        stmt.query_map([], |row| row.get(0))
            .expect("query ledger")
            .collect::<Result<Vec<String>, _>>()
            .expect("read ledger")
    }
}

/// Profile matching the encounter import: key, one date and one datetime column.
pub fn encounter_profile() -> TargetProfile {
    let mut profile =
        TargetProfile::new("staging_patient_encounters").with_key_column("encounter_id");
    profile.success_ledger = "import_encounter_logs".into();
    profile.failure_ledger = "import_encounter_failures".into();
    profile.date_columns = vec!["encounter_date".into()];
    profile.datetime_columns = vec!["updated_date".into()];
    profile
}
