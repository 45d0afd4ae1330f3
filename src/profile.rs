//! Target profiles: the per-table configuration that drives one pipeline.
//!
//! A profile names the staging table, its optional dedup key, the ledger tables,
//! and which columns carry dates. Profiles are YAML documents loaded through
//! `serde_yaml`; every field except `target_table` has a default so the same
//! pipeline can serve any table by configuration alone.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

pub const DEFAULT_SUCCESS_LEDGER: &str = "imported_files_log";
pub const DEFAULT_FAILURE_LEDGER: &str = "import_failures";
pub const DEFAULT_MAX_ERROR_LENGTH: usize = 1000;
pub const DEFAULT_NULL_TOKENS: &[&str] = &["\\N", "NA", "null", "NULL", ""];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetProfile {
    pub target_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    #[serde(default = "default_success_ledger")]
    pub success_ledger: String,
    #[serde(default = "default_failure_ledger")]
    pub failure_ledger: String,
    /// Date columns; unparseable values fall back to `sentinel_date`.
    #[serde(default)]
    pub date_columns: Vec<String>,
    /// Date columns whose unparseable values stay missing.
    #[serde(default)]
    pub nullable_date_columns: Vec<String>,
    /// Timestamp columns rendered as `YYYY-MM-DD HH:MM`; unparseable values stay missing.
    #[serde(default)]
    pub datetime_columns: Vec<String>,
    #[serde(default = "default_null_tokens")]
    pub null_tokens: Vec<String>,
    #[serde(default = "default_sentinel_date")]
    pub sentinel_date: NaiveDate,
    #[serde(default = "default_max_error_length")]
    pub max_error_length: usize,
}

fn default_success_ledger() -> String {
    DEFAULT_SUCCESS_LEDGER.to_string()
}

fn default_failure_ledger() -> String {
    DEFAULT_FAILURE_LEDGER.to_string()
}

fn default_null_tokens() -> Vec<String> {
    DEFAULT_NULL_TOKENS.iter().map(|t| t.to_string()).collect()
}

pub fn default_sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

fn default_max_error_length() -> usize {
    DEFAULT_MAX_ERROR_LENGTH
}

impl TargetProfile {
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            key_column: None,
            success_ledger: default_success_ledger(),
            failure_ledger: default_failure_ledger(),
            date_columns: Vec::new(),
            nullable_date_columns: Vec::new(),
            datetime_columns: Vec::new(),
            null_tokens: default_null_tokens(),
            sentinel_date: default_sentinel_date(),
            max_error_length: default_max_error_length(),
        }
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening profile {path:?}"))?;
        let reader = BufReader::new(file);
        let profile: TargetProfile =
            serde_yaml::from_reader(reader).context("Parsing profile YAML")?;
        Ok(profile)
    }

    /// Checks identifiers before any of them reach SQL text.
    pub fn validate(&self) -> IngestResult<()> {
        validate_identifier("target table", &self.target_table)?;
        validate_identifier("success ledger", &self.success_ledger)?;
        validate_identifier("failure ledger", &self.failure_ledger)?;
        if let Some(key) = &self.key_column {
            validate_identifier("key column", key)?;
        }
        if self.success_ledger == self.failure_ledger {
            return Err(IngestError::Configuration(format!(
                "Success and failure ledgers must be distinct tables (both '{}')",
                self.success_ledger
            )));
        }
        if self.max_error_length == 0 {
            return Err(IngestError::Configuration(
                "max_error_length must be greater than zero".to_string(),
            ));
        }
        let rules = [
            ("date", &self.date_columns),
            ("nullable date", &self.nullable_date_columns),
            ("datetime", &self.datetime_columns),
        ];
        for (i, (first, columns)) in rules.iter().enumerate() {
            for (second, others) in &rules[i + 1..] {
                if let Some(column) = columns.iter().find(|c| others.contains(c)) {
                    return Err(IngestError::Configuration(format!(
                        "Column '{column}' is configured as both a {first} and a {second} column"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`; anything else is rejected rather than quoted.
pub fn validate_identifier(role: &str, name: &str) -> IngestResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(IngestError::Configuration(format!(
            "Invalid {role} name '{name}'"
        )))
    }
}

/// Double-quotes a column name taken from a source header.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
