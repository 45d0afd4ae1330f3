use csv_stager::ledger::{LedgerStore, sanitize_error_message};
use proptest::prelude::*;
use rusqlite::Connection;

#[test]
fn stored_failure_message_is_bounded_to_default_length() {
    let conn = Connection::open_in_memory().expect("in-memory database");
    let ledger = LedgerStore::new("ok_log", "fail_log").expect("ledger");
    ledger.ensure_tables(&conn).expect("ledger tables");
    let message = "x'".repeat(1500);
    ledger
        .record_failure(&conn, "long.csv", &message)
        .expect("record failure");
    let stored: String = conn
        .query_row(
            "SELECT error_message FROM fail_log WHERE file_name = 'long.csv'",
            [],
            |row| row.get(0),
        )
        .expect("stored message");
    assert_eq!(stored.chars().count(), 1000);
    assert!(!stored.contains('\''));
}

proptest! {
    #[test]
    fn sanitized_messages_are_bounded_and_quote_free(
        message in ".{0,300}",
        max_len in 1usize..200,
    ) {
        let sanitized = sanitize_error_message(&message, max_len);
        prop_assert!(sanitized.chars().count() <= max_len);
        prop_assert!(!sanitized.contains('\''));
        let expected = message.chars().filter(|c| *c != '\'').take(max_len).collect::<String>();
        prop_assert_eq!(sanitized, expected);
    }

    #[test]
    fn sanitizing_twice_changes_nothing(message in ".{0,300}", max_len in 1usize..200) {
        let once = sanitize_error_message(&message, max_len);
        prop_assert_eq!(sanitize_error_message(&once, max_len), once.clone());
    }
}
