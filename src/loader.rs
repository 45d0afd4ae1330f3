//! One file's load as a single all-or-nothing transaction.
//!
//! Inside the transaction the loader re-checks the success ledger, reads the
//! target's existing keys, drops duplicate rows, appends what remains and writes
//! the success entry. Dropping the transaction on any early return or error
//! rolls everything back, so a file's rows and its ledger entry are committed
//! together or not at all.

use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, info};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;

use crate::{
    data::Batch,
    dedup::{existing_keys, retain_new_rows},
    error::IngestResult,
    ledger::LedgerStore,
    profile::{TargetProfile, quote_identifier, validate_identifier},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The success ledger already lists the file; nothing was written.
    AlreadyImported,
    /// Every row was a duplicate. The file stays unrecorded so a later,
    /// larger version of it can still be loaded.
    NoNewRows { duplicates: usize },
    Inserted { rows: usize, duplicates: usize },
}

#[derive(Debug, Clone)]
pub struct Loader {
    table: String,
    key_column: Option<String>,
    ledger: LedgerStore,
}

impl Loader {
    pub fn new(table: &str, key_column: Option<&str>, ledger: LedgerStore) -> IngestResult<Self> {
        validate_identifier("target table", table)?;
        if let Some(key) = key_column {
            validate_identifier("key column", key)?;
        }
        Ok(Self {
            table: table.to_string(),
            key_column: key_column.map(str::to_string),
            ledger,
        })
    }

    pub fn from_profile(profile: &TargetProfile) -> IngestResult<Self> {
        Self::new(
            &profile.target_table,
            profile.key_column.as_deref(),
            LedgerStore::from_profile(profile)?,
        )
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn load(
        &self,
        conn: &mut Connection,
        file_name: &str,
        batch: Batch,
    ) -> IngestResult<LoadOutcome> {
        let tx = conn.transaction()?;

        if self.ledger.has_succeeded(&tx, file_name)? {
            debug!("{file_name} found in success ledger inside load transaction");
            return Ok(LoadOutcome::AlreadyImported);
        }

        let existing = match &self.key_column {
            Some(key) => existing_keys(&tx, &self.table, key)?,
            None => HashSet::new(),
        };
        let deduplicated = retain_new_rows(batch, self.key_column.as_deref(), &existing)?;
        let duplicates = deduplicated.existing + deduplicated.repeated;
        if deduplicated.repeated > 0 {
            debug!(
                "{file_name}: dropped {} row(s) repeating a key earlier in the file",
                deduplicated.repeated
            );
        }
        if deduplicated.batch.is_empty() {
            return Ok(LoadOutcome::NoNewRows { duplicates });
        }

        info!(
            "Inserting {} row(s) from {file_name} into '{}'",
            deduplicated.batch.len(),
            self.table
        );
        let rows = insert_rows(&tx, &self.table, &deduplicated.batch)?;
        self.ledger.record_success(&tx, file_name)?;
        tx.commit()?;
        Ok(LoadOutcome::Inserted { rows, duplicates })
    }
}

/// Appends every batch row with one prepared statement naming the batch's columns.
fn insert_rows(conn: &Connection, table: &str, batch: &Batch) -> IngestResult<usize> {
    let columns = batch.columns().iter().map(|c| quote_identifier(c)).join(", ");
    let placeholders = (1..=batch.columns().len())
        .map(|idx| format!("?{idx}"))
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders})"
    ))?;
    for row in batch.rows() {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(batch.len())
}
