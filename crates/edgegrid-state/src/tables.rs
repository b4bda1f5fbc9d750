//! redb table definitions for the EdgeGrid state store.

use redb::TableDefinition;

/// Cached objects keyed by resource string.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Secondary index keyed by `{type}\0{key}`; values are empty.
pub const RECORDS_BY_TYPE: TableDefinition<&str, &[u8]> = TableDefinition::new("records_by_type");

/// Persisted node-task intent keyed by node-task resource type.
pub const TASK_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("task_records");

pub(crate) const INDEX_SEP: char = '\0';

/// Index key for a record of `record_type` at `key`.
pub(crate) fn type_index_key(record_type: &str, key: &str) -> String {
    format!("{record_type}{INDEX_SEP}{key}")
}

/// Half-open bounds covering every index entry for `record_type`.
pub(crate) fn type_index_range(record_type: &str) -> (String, String) {
    (
        format!("{record_type}{INDEX_SEP}"),
        format!("{record_type}\u{1}"),
    )
}
