//! Persistent per-file ledgers.
//!
//! The success ledger holds one row per file that was committed; its presence is
//! the only thing that marks a file as imported. The failure ledger keeps the
//! most recent error per file and never blocks a retry. Every operation takes a
//! `Connection`, so callers can run them inside their own `Transaction`.

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::Serialize;

use crate::{
    error::{IngestError, IngestResult},
    profile::{DEFAULT_MAX_ERROR_LENGTH, TargetProfile, validate_identifier},
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessEntry {
    pub file_name: String,
    pub inserted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub file_name: String,
    pub failed_at: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    success_table: String,
    failure_table: String,
    max_error_length: usize,
}

impl LedgerStore {
    pub fn new(success_table: &str, failure_table: &str) -> IngestResult<Self> {
        validate_identifier("success ledger", success_table)?;
        validate_identifier("failure ledger", failure_table)?;
        Ok(Self {
            success_table: success_table.to_string(),
            failure_table: failure_table.to_string(),
            max_error_length: DEFAULT_MAX_ERROR_LENGTH,
        })
    }

    pub fn from_profile(profile: &TargetProfile) -> IngestResult<Self> {
        Ok(Self::new(&profile.success_ledger, &profile.failure_ledger)?
            .with_max_error_length(profile.max_error_length))
    }

    pub fn with_max_error_length(mut self, max_error_length: usize) -> Self {
        self.max_error_length = max_error_length;
        self
    }

    pub fn success_table(&self) -> &str {
        &self.success_table
    }

    pub fn failure_table(&self) -> &str {
        &self.failure_table
    }

    /// Creates both ledger tables when missing; safe to call on every start.
    pub fn ensure_tables(&self, conn: &Connection) -> IngestResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {success} (
                file_name TEXT PRIMARY KEY,
                inserted_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {failure} (
                file_name TEXT PRIMARY KEY,
                failed_at TEXT NOT NULL,
                error_message TEXT
            );",
            success = self.success_table,
            failure = self.failure_table,
        ))?;
        debug!(
            "Ledger tables '{}' and '{}' ready",
            self.success_table, self.failure_table
        );
        Ok(())
    }

    pub fn has_succeeded(&self, conn: &Connection, file_name: &str) -> IngestResult<bool> {
        let found = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE file_name = ?1", self.success_table),
                params![file_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fails with [`IngestError::DuplicateKey`] when the file is already recorded.
    pub fn record_success(&self, conn: &Connection, file_name: &str) -> IngestResult<()> {
        self.record_success_at(conn, file_name, Utc::now())
    }

    pub fn record_success_at(
        &self,
        conn: &Connection,
        file_name: &str,
        at: DateTime<Utc>,
    ) -> IngestResult<()> {
        let result = conn.execute(
            &format!(
                "INSERT INTO {} (file_name, inserted_at) VALUES (?1, ?2)",
                self.success_table
            ),
            params![file_name, at.format(TIMESTAMP_FORMAT).to_string()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(IngestError::DuplicateKey(file_name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Inserts or overwrites the failure entry for `file_name`.
    pub fn record_failure(
        &self,
        conn: &Connection,
        file_name: &str,
        message: &str,
    ) -> IngestResult<()> {
        self.record_failure_at(conn, file_name, message, Utc::now())
    }

    pub fn record_failure_at(
        &self,
        conn: &Connection,
        file_name: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> IngestResult<()> {
        let message = sanitize_error_message(message, self.max_error_length);
        conn.execute(
            &format!(
                "INSERT INTO {} (file_name, failed_at, error_message) VALUES (?1, ?2, ?3)
                 ON CONFLICT (file_name) DO UPDATE SET
                     error_message = excluded.error_message,
                     failed_at = excluded.failed_at",
                self.failure_table
            ),
            params![file_name, at.format(TIMESTAMP_FORMAT).to_string(), message],
        )?;
        Ok(())
    }

    pub fn successes(&self, conn: &Connection) -> IngestResult<Vec<SuccessEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT file_name, inserted_at FROM {} ORDER BY file_name",
            self.success_table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(SuccessEntry {
                file_name: row.get(0)?,
                inserted_at: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn failures(&self, conn: &Connection) -> IngestResult<Vec<FailureEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT file_name, failed_at, error_message FROM {} ORDER BY file_name",
            self.failure_table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(FailureEntry {
                file_name: row.get(0)?,
                failed_at: row.get(1)?,
                error_message: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Drops single quotes and truncates to at most `max_len` characters.
pub fn sanitize_error_message(message: &str, max_len: usize) -> String {
    message
        .chars()
        .filter(|c| *c != '\'')
        .take(max_len)
        .collect()
}
