use std::{collections::HashSet, path::Path};

use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::{Batch, Cell},
    error::{IngestError, IngestResult},
    io_utils,
    profile::DEFAULT_NULL_TOKENS,
};

/// Settings for turning one source file into a [`Batch`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Field delimiter; resolved from the file extension when unset.
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    /// Raw field values read as missing before type detection.
    pub null_tokens: Vec<String>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
            null_tokens: DEFAULT_NULL_TOKENS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

/// Reads a delimited file with a header row. Columns whose non-missing values
/// all parse as integers (or floats) become numeric; everything else is text.
pub fn decode_file(path: &Path, options: &DecodeOptions) -> IngestResult<Batch> {
    let file_name = io_utils::ledger_file_name(path);
    let fail = |message: String| IngestError::decode(file_name.clone(), message);

    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)
        .map_err(|err| fail(format!("Opening {path:?}: {err}")))?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .map_err(|err| fail(format!("Reading header row: {err:#}")))?;
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(fail("No columns to parse from file".to_string()));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(fail(format!("Duplicate column '{duplicate}' in header row")));
    }

    let null_tokens = options
        .null_tokens
        .iter()
        .map(|t| t.as_str())
        .collect::<HashSet<_>>();
    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut record = csv::ByteRecord::new();
    loop {
        let line = raw_rows.len() + 2;
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| fail(format!("Reading row {line}: {err}")))?;
        if !more {
            break;
        }
        let decoded = io_utils::decode_record(&record, options.encoding)
            .map_err(|err| fail(format!("Row {line}: {err:#}")))?;
        raw_rows.push(
            decoded
                .into_iter()
                .map(|value| (!null_tokens.contains(value.as_str())).then_some(value))
                .collect(),
        );
    }

    let kinds = (0..headers.len())
        .map(|idx| detect_kind(raw_rows.iter().filter_map(|row| row[idx].as_deref())))
        .collect::<Vec<_>>();
    debug!("Decoded {} row(s) from {file_name}; column kinds {kinds:?}", raw_rows.len());

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(value, kind)| typed_cell(value, *kind))
                .collect()
        })
        .collect();
    Batch::new(headers, rows)
}

fn detect_kind<'a>(values: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind = ColumnKind::Integer;
    for value in values {
        if kind == ColumnKind::Integer && value.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && !fits_float(value) {
            return ColumnKind::Text;
        }
    }
    kind
}

/// Integers, or literals with a fraction or exponent. Digit runs too long for
/// `i64` are identifiers and must not lose precision in an `f64`.
fn fits_float(value: &str) -> bool {
    if value.parse::<i64>().is_ok() {
        return true;
    }
    value.contains(['.', 'e', 'E'])
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && value.parse::<f64>().is_ok()
}

fn typed_cell(value: Option<String>, kind: ColumnKind) -> Cell {
    let Some(value) = value else {
        return Cell::Null;
    };
    match kind {
        ColumnKind::Integer => value.parse().map(Cell::Integer).unwrap_or(Cell::Text(value)),
        ColumnKind::Float => value.parse().map(Cell::Float).unwrap_or(Cell::Text(value)),
        ColumnKind::Text => Cell::Text(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn decode_str(name: &str, contents: &str) -> IngestResult<Batch> {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        decode_file(&path, &DecodeOptions::default())
    }

    #[test]
    fn detects_numeric_and_text_columns() {
        let batch = decode_str("a.csv", "id,amount,name\n1,2.5,Alice\n2,3,Bob\n").unwrap();
        assert_eq!(batch.rows()[0][0], Cell::Integer(1));
        assert_eq!(batch.rows()[1][1], Cell::Float(3.0));
        assert_eq!(batch.rows()[1][2], Cell::Text("Bob".into()));
    }

    #[test]
    fn null_tokens_are_missing_and_ignored_by_detection() {
        let batch = decode_str("a.csv", "id,code\n1,\\N\nNA,7\n3,NULL\n").unwrap();
        assert_eq!(batch.rows()[1][0], Cell::Null);
        assert_eq!(batch.rows()[0][1], Cell::Null);
        assert_eq!(batch.rows()[1][1], Cell::Integer(7));
        assert_eq!(batch.rows()[2][0], Cell::Integer(3));
    }

    #[test]
    fn integers_beyond_i64_stay_distinct_text() {
        let batch = decode_str(
            "ids.csv",
            "record_id,name\n12345678901234567890123,A\n12345678901234567890124,B\n",
        )
        .unwrap();
        assert_eq!(
            batch.rows()[0][0],
            Cell::Text("12345678901234567890123".into())
        );
        assert_eq!(
            batch.rows()[1][0],
            Cell::Text("12345678901234567890124".into())
        );

        let deduped =
            crate::dedup::retain_new_rows(batch, Some("record_id"), &HashSet::new()).unwrap();
        assert_eq!(deduped.batch.len(), 2);
        assert_eq!(deduped.repeated, 0);
    }

    #[test]
    fn integer_and_fractional_values_share_a_float_column() {
        let batch = decode_str("f.csv", "amount\n3\n2.5\n1e3\n").unwrap();
        assert_eq!(batch.rows()[0][0], Cell::Float(3.0));
        assert_eq!(batch.rows()[2][0], Cell::Float(1000.0));
    }

    #[test]
    fn padded_numbers_stay_text() {
        let batch = decode_str("a.csv", "id\n 1 \n2\n").unwrap();
        assert_eq!(batch.rows()[0][0], Cell::Text(" 1 ".into()));
        assert_eq!(batch.rows()[1][0], Cell::Text("2".into()));
    }

    #[test]
    fn empty_file_is_a_decode_error() {
        let err = decode_str("empty.csv", "").unwrap_err();
        assert!(matches!(err, IngestError::Decode { ref file, .. } if file == "empty.csv"));
    }

    #[test]
    fn ragged_rows_are_a_decode_error() {
        let err = decode_str("bad.csv", "id,name\n1,Alice\n2\n").unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("row 3"), "{err}");
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        assert!(decode_str("dup.csv", "id,id\n1,2\n").is_err());
    }

    #[test]
    fn header_only_file_decodes_to_empty_batch() {
        let batch = decode_str("h.csv", "id,name\n").unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.columns().len(), 2);
    }
}
