//! Row normalization applied to every decoded batch before it is loaded.
//!
//! Text cells are trimmed and configured null tokens become missing. Date
//! columns become [`Cell::Date`] with a sentinel fallback, nullable date
//! columns the same without the fallback, and datetime columns
//! [`Cell::DateTime`] truncated to the minute with unparseable values left
//! missing. Both render as `YYYY-MM-DD` / `YYYY-MM-DD HH:MM` when bound.
//! Malformed dates never fail a batch.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use log::debug;

use crate::{
    data::{Batch, Cell, parse_naive_date, parse_naive_datetime},
    profile::{TargetProfile, default_sentinel_date},
};

/// How a configured column's values are canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    /// Calendar date; missing or unparseable values become the sentinel.
    Date,
    /// Calendar date; missing or unparseable values stay missing.
    NullableDate,
    /// Timestamp to minute precision; unparseable values stay missing.
    DateTime,
}

#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    pub null_tokens: HashSet<String>,
    pub date_rules: Vec<(String, DateRule)>,
    pub sentinel_date: NaiveDate,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            null_tokens: HashSet::new(),
            date_rules: Vec::new(),
            sentinel_date: default_sentinel_date(),
        }
    }
}

impl NormalizeConfig {
    pub fn from_profile(profile: &TargetProfile) -> Self {
        let rules = profile
            .date_columns
            .iter()
            .map(|c| (c.clone(), DateRule::Date))
            .chain(
                profile
                    .nullable_date_columns
                    .iter()
                    .map(|c| (c.clone(), DateRule::NullableDate)),
            )
            .chain(
                profile
                    .datetime_columns
                    .iter()
                    .map(|c| (c.clone(), DateRule::DateTime)),
            )
            .collect();
        Self {
            null_tokens: profile.null_tokens.iter().cloned().collect(),
            date_rules: rules,
            sentinel_date: profile.sentinel_date,
        }
    }
}

pub fn normalize_batch(mut batch: Batch, config: &NormalizeConfig) -> Batch {
    batch.map_cells(|cell| clean_cell(cell, &config.null_tokens));
    for (column, rule) in &config.date_rules {
        let Some(idx) = batch.column_index(column) else {
            debug!("Date column '{column}' not present in batch; skipping");
            continue;
        };
        batch.map_column(idx, |cell| apply_date_rule(cell, *rule, config.sentinel_date));
    }
    batch
}

fn clean_cell(cell: Cell, null_tokens: &HashSet<String>) -> Cell {
    match cell {
        Cell::Text(value) => {
            let trimmed = value.trim();
            if null_tokens.contains(trimmed) {
                Cell::Null
            } else if trimmed.len() == value.len() {
                Cell::Text(value)
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}

fn apply_date_rule(cell: Cell, rule: DateRule, sentinel: NaiveDate) -> Cell {
    match rule {
        DateRule::Date => Cell::Date(cell_to_date(&cell).unwrap_or(sentinel)),
        DateRule::NullableDate => cell_to_date(&cell).map(Cell::Date).unwrap_or(Cell::Null),
        DateRule::DateTime => cell_to_datetime(&cell)
            .and_then(truncate_to_minute)
            .map(Cell::DateTime)
            .unwrap_or(Cell::Null),
    }
}

fn truncate_to_minute(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    dt.with_second(0)?.with_nanosecond(0)
}

fn cell_to_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_naive_date(s).ok(),
        _ => None,
    }
}

fn cell_to_datetime(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Date(d) => d.and_hms_opt(0, 0, 0),
        Cell::Text(s) => parse_naive_datetime(s).ok(),
        _ => None,
    }
}
