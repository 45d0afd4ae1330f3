use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

use crate::error::{IngestError, IngestResult};

pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One typed value of a batch. `Date` and `DateTime` are produced by
/// normalization; `DateTime` is held at minute precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn as_display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Integer(i) => i.to_string(),
            Cell::Float(f) => float_display(*f),
            Cell::Date(d) => d.format(DATE_OUTPUT_FORMAT).to_string(),
            Cell::DateTime(dt) => dt.format(DATETIME_OUTPUT_FORMAT).to_string(),
        }
    }

    /// Canonical text used to compare dedup keys; `None` for missing values.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            other => Some(other.as_display()),
        }
    }
}

fn float_display(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(SqlValue::Null),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cell::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Cell::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Cell::Date(_) | Cell::DateTime(_) => ToSqlOutput::Owned(SqlValue::Text(self.as_display())),
        })
    }
}

/// Canonical key text for a value read back from the target table.
pub fn sql_key_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(i) => Some(i.to_string()),
        SqlValue::Real(f) => Some(float_display(*f)),
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// In-memory table decoded from one source file. The column set never changes
/// after construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Batch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> IngestResult<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(IngestError::Configuration(format!(
                "Row {} has {} cell(s) but the batch declares {} column(s)",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rewrites every cell of one column in place.
    pub fn map_column<F>(&mut self, idx: usize, mut f: F)
    where
        F: FnMut(Cell) -> Cell,
    {
        for row in &mut self.rows {
            if let Some(slot) = row.get_mut(idx) {
                let cell = std::mem::replace(slot, Cell::Null);
                *slot = f(cell);
            }
        }
    }

    pub fn map_cells<F>(&mut self, mut f: F)
    where
        F: FnMut(Cell) -> Cell,
    {
        for idx in 0..self.columns.len() {
            self.map_column(idx, &mut f);
        }
    }

    pub fn retain_rows<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&[Cell]) -> bool,
    {
        self.rows.retain(|row| keep(row));
        self
    }
}

// Ambiguous slash and dash dates are month-first; the day-first forms only
// match once the leading field exceeds 12.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

fn parse_date_only(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn parse_datetime_only(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parses a calendar date; timestamps are accepted and their time discarded.
pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    parse_date_only(value)
        .or_else(|| parse_datetime_only(value).map(|dt| dt.date()))
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as date"))
}

/// Parses a timestamp; a bare date is read as midnight.
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    parse_datetime_only(value)
        .or_else(|| parse_date_only(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as datetime"))
}
