use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    ledger::{FailureEntry, SuccessEntry},
    pipeline::{FileOutcome, RunSummary},
};

/// Cells wider than this are cut and end with `...`; error messages can be long.
pub const MAX_CELL_WIDTH: usize = 80;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let cells = rows
        .iter()
        .map(|row| row.iter().map(|cell| fit_cell(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| Cow::Borrowed(*h)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let separator = widths
        .iter()
        .map(|w| Cow::Owned("-".repeat((*w).max(3))))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in &cells {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn render_summary(summary: &RunSummary) -> String {
    let rows = summary
        .files
        .iter()
        .map(|report| {
            let (rows, detail) = match &report.outcome {
                FileOutcome::Succeeded { rows, duplicates } => {
                    (rows.to_string(), format!("{duplicates} duplicate(s) skipped"))
                }
                FileOutcome::SkippedEmpty { duplicates } => {
                    ("0".to_string(), format!("{duplicates} duplicate(s) skipped"))
                }
                FileOutcome::SkippedAlreadyImported => ("0".to_string(), String::new()),
                FileOutcome::Failed { kind, reason } => ("0".to_string(), format!("[{kind}] {reason}")),
            };
            vec![
                report.file_name.clone(),
                report.outcome.label().to_string(),
                rows,
                detail,
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["file", "status", "rows", "detail"], &rows)
}

pub fn render_successes(entries: &[SuccessEntry]) -> String {
    let rows = entries
        .iter()
        .map(|e| vec![e.file_name.clone(), e.inserted_at.clone()])
        .collect::<Vec<_>>();
    render_table(&["file_name", "inserted_at"], &rows)
}

pub fn render_failures(entries: &[FailureEntry]) -> String {
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.file_name.clone(),
                e.failed_at.clone(),
                e.error_message.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["file_name", "failed_at", "error_message"], &rows)
}

fn format_row(values: &[Cow<'_, str>], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(value.chars().count());
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

/// Flattens control characters and truncates to [`MAX_CELL_WIDTH`].
fn fit_cell(value: &str) -> Cow<'_, str> {
    let needs_flatten = value.contains(['\n', '\r', '\t']);
    let too_wide = value.chars().count() > MAX_CELL_WIDTH;
    if !needs_flatten && !too_wide {
        return Cow::Borrowed(value);
    }
    let mut fitted = value
        .chars()
        .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
        .collect::<String>();
    if too_wide {
        fitted = fitted.chars().take(MAX_CELL_WIDTH - 3).collect();
        fitted.push_str("...");
    }
    Cow::Owned(fitted)
}
