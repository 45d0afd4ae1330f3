//! Sequential driver over a run's source files.
//!
//! Each file is decoded, normalized and handed to the [`Loader`], one at a time.
//! Any error from those steps is written to the failure ledger in its own
//! transaction and the run moves on; only opening the database or creating the
//! ledger tables can abort a run. The connection is owned by the [`Pipeline`]
//! and released when it is dropped.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    decode::{DecodeOptions, decode_file},
    error::{IngestError, IngestResult},
    io_utils::ledger_file_name,
    ledger::sanitize_error_message,
    loader::{LoadOutcome, Loader},
    normalize::{NormalizeConfig, normalize_batch},
    profile::TargetProfile,
};

/// Terminal state of one file within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    SkippedAlreadyImported,
    SkippedEmpty { duplicates: usize },
    Succeeded { rows: usize, duplicates: usize },
    Failed { kind: String, reason: String },
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::SkippedAlreadyImported => "already imported",
            FileOutcome::SkippedEmpty { .. } => "no new rows",
            FileOutcome::Succeeded { .. } => "imported",
            FileOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }
}

impl From<LoadOutcome> for FileOutcome {
    fn from(outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::AlreadyImported => FileOutcome::SkippedAlreadyImported,
            LoadOutcome::NoNewRows { duplicates } => FileOutcome::SkippedEmpty { duplicates },
            LoadOutcome::Inserted { rows, duplicates } => {
                FileOutcome::Succeeded { rows, duplicates }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub target_table: String,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    /// The run's contractual output: names of files that failed, in run order.
    pub fn failed_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|report| report.outcome.is_failure())
            .map(|report| report.file_name.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.files.iter().all(|report| !report.outcome.is_failure())
    }

    pub fn rows_inserted(&self) -> usize {
        self.files
            .iter()
            .map(|report| match report.outcome {
                FileOutcome::Succeeded { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome_of(&self, file_name: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|report| report.file_name == file_name)
            .map(|report| &report.outcome)
    }
}

pub struct Pipeline {
    conn: Connection,
    loader: Loader,
    normalize: NormalizeConfig,
    decode: DecodeOptions,
    max_error_length: usize,
}

impl Pipeline {
    /// Opens the database and creates missing ledger tables.
    pub fn open(database: &Path, profile: &TargetProfile) -> IngestResult<Self> {
        let conn = Connection::open(database).map_err(|err| {
            IngestError::Connectivity(format!("Opening database {database:?}: {err}"))
        })?;
        Self::with_connection(conn, profile)
    }

    pub fn with_connection(conn: Connection, profile: &TargetProfile) -> IngestResult<Self> {
        profile.validate()?;
        let loader = Loader::from_profile(profile)?;
        loader.ledger().ensure_tables(&conn)?;
        Ok(Self {
            conn,
            loader,
            normalize: NormalizeConfig::from_profile(profile),
            decode: DecodeOptions {
                null_tokens: profile.null_tokens.clone(),
                ..DecodeOptions::default()
            },
            max_error_length: profile.max_error_length,
        })
    }

    pub fn with_source_format(mut self, delimiter: Option<u8>, encoding: &'static Encoding) -> Self {
        self.decode.delimiter = delimiter;
        self.decode.encoding = encoding;
        self
    }

    /// Processes `files` strictly in order; one bad file never stops the run.
    pub fn run(&mut self, files: &[PathBuf]) -> RunSummary {
        let mut summary = RunSummary {
            target_table: self.loader.table().to_string(),
            files: Vec::with_capacity(files.len()),
        };
        for path in files {
            let file_name = ledger_file_name(path);
            let outcome = self.process_file(path);
            summary.files.push(FileReport { file_name, outcome });
        }
        summary
    }

    pub fn process_file(&mut self, path: &Path) -> FileOutcome {
        let file_name = ledger_file_name(path);
        info!("Reading file: {}", path.display());
        match self.try_process(path, &file_name) {
            Ok(outcome) => {
                match &outcome {
                    FileOutcome::SkippedAlreadyImported => {
                        info!("Skipping already imported file: {file_name}")
                    }
                    FileOutcome::SkippedEmpty { duplicates } => warn!(
                        "No new rows to insert for {file_name} ({duplicates} duplicate(s)); skipping"
                    ),
                    FileOutcome::Succeeded { rows, .. } => {
                        info!("✓ Inserted {rows} row(s) and logged {file_name}")
                    }
                    FileOutcome::Failed { .. } => {}
                }
                outcome
            }
            Err(err) => {
                let reason = sanitize_error_message(&err.to_string(), self.max_error_length);
                error!("Error processing {file_name}: {err}");
                if let Err(ledger_err) = self.record_failure(&file_name, &reason) {
                    error!("Could not record failure for {file_name}: {ledger_err}");
                }
                FileOutcome::Failed {
                    kind: err.kind().to_string(),
                    reason,
                }
            }
        }
    }

    fn try_process(&mut self, path: &Path, file_name: &str) -> IngestResult<FileOutcome> {
        // Imported files are never decoded; the loader repeats this check in its transaction.
        if self.loader.ledger().has_succeeded(&self.conn, file_name)? {
            return Ok(FileOutcome::SkippedAlreadyImported);
        }
        let batch = decode_file(path, &self.decode)?;
        let batch = normalize_batch(batch, &self.normalize);
        let outcome = self.loader.load(&mut self.conn, file_name, batch)?;
        Ok(outcome.into())
    }

    fn record_failure(&mut self, file_name: &str, reason: &str) -> IngestResult<()> {
        let tx = self.conn.transaction()?;
        self.loader.ledger().record_failure(&tx, file_name, reason)?;
        tx.commit()?;
        Ok(())
    }
}
