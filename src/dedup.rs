use std::collections::HashSet;

use rusqlite::{Connection, types::Value as SqlValue};

use crate::{
    data::{Batch, sql_key_text},
    error::{IngestError, IngestResult},
    profile::quote_identifier,
};

/// Rows that survived deduplication plus counts of what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    pub batch: Batch,
    /// Rows whose key already exists in the target table.
    pub existing: usize,
    /// Rows repeating a key seen earlier in the same batch.
    pub repeated: usize,
}

/// Reads the canonical text of every non-null key currently in `table`.
pub fn existing_keys(
    conn: &Connection,
    table: &str,
    key_column: &str,
) -> IngestResult<HashSet<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {}",
        quote_identifier(key_column),
        table
    ))?;
    let mut rows = stmt.query([])?;
    let mut keys = HashSet::new();
    while let Some(row) = rows.next()? {
        let value: SqlValue = row.get(0)?;
        if let Some(key) = sql_key_text(&value) {
            keys.insert(key);
        }
    }
    Ok(keys)
}

/// Keeps rows whose key is not in `existing` and has not appeared earlier in
/// the batch. Without a key column the batch passes through untouched; a
/// configured key column that the batch lacks is a configuration error.
/// Rows with a missing key are always kept.
pub fn retain_new_rows(
    batch: Batch,
    key_column: Option<&str>,
    existing: &HashSet<String>,
) -> IngestResult<Deduplicated> {
    let Some(key_column) = key_column else {
        return Ok(Deduplicated {
            batch,
            existing: 0,
            repeated: 0,
        });
    };
    let idx = batch.column_index(key_column).ok_or_else(|| {
        IngestError::Configuration(format!(
            "Key column '{key_column}' is not present in the source file (columns: {})",
            batch.columns().join(", ")
        ))
    })?;

    let mut seen = HashSet::new();
    let mut existing_hits = 0usize;
    let mut repeated = 0usize;
    let batch = batch.retain_rows(|row| {
        let Some(key) = row[idx].key_text() else {
            return true;
        };
        if existing.contains(&key) {
            existing_hits += 1;
            false
        } else if !seen.insert(key) {
            repeated += 1;
            false
        } else {
            true
        }
    });
    Ok(Deduplicated {
        batch,
        existing: existing_hits,
        repeated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn batch(ids: &[Cell]) -> Batch {
        Batch::new(
            vec!["id".into(), "note".into()],
            ids.iter()
                .map(|id| vec![id.clone(), Cell::Text("n".into())])
                .collect(),
        )
        .unwrap()
    }

    fn keys(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn drops_rows_with_existing_keys() {
        let out = retain_new_rows(
            batch(&[Cell::Integer(2), Cell::Integer(3)]),
            Some("id"),
            &keys(&["1", "2"]),
        )
        .unwrap();
        assert_eq!(out.batch.len(), 1);
        assert_eq!(out.batch.rows()[0][0], Cell::Integer(3));
        assert_eq!(out.existing, 1);
    }

    #[test]
    fn without_key_column_batch_is_unchanged() {
        let input = batch(&[Cell::Integer(1), Cell::Integer(1)]);
        let out = retain_new_rows(input.clone(), None, &keys(&["1"])).unwrap();
        assert_eq!(out.batch, input);
    }

    #[test]
    fn missing_key_column_is_a_configuration_error() {
        let err = retain_new_rows(batch(&[Cell::Integer(1)]), Some("case_id"), &keys(&[]))
            .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn repeated_keys_within_batch_keep_first() {
        let input = Batch::new(
            vec!["id".into(), "note".into()],
            vec![
                vec![Cell::Integer(5), Cell::Text("first".into())],
                vec![Cell::Integer(5), Cell::Text("second".into())],
                vec![Cell::Null, Cell::Text("no key".into())],
                vec![Cell::Null, Cell::Text("no key".into())],
            ],
        )
        .unwrap();
        let out = retain_new_rows(input, Some("id"), &keys(&[])).unwrap();
        assert_eq!(out.batch.len(), 3);
        assert_eq!(out.batch.rows()[0][1], Cell::Text("first".into()));
        assert_eq!(out.repeated, 1);
    }

    #[test]
    fn text_and_numeric_keys_compare_by_canonical_text() {
        let out = retain_new_rows(
            batch(&[Cell::Text("7".into()), Cell::Float(8.0)]),
            Some("id"),
            &keys(&["7", "8"]),
        )
        .unwrap();
        assert!(out.batch.is_empty());
    }

    #[test]
    fn existing_keys_reads_target_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE staging (id INTEGER, name TEXT);
             INSERT INTO staging VALUES (1, 'a'), (2.0, 'b'), (NULL, 'c'), ('x9', 'd');",
        )
        .unwrap();
        let found = existing_keys(&conn, "staging", "id").unwrap();
        assert_eq!(found, keys(&["1", "2", "x9"]));
    }
}
