//! Ordering key selection.
//!
//! Three strategies share the same preference for the implicit row identity
//! column; they differ in which declared keys they accept:
//!
//! - [`select_ordering_key`]: one numeric column for integer-range splitting
//! - [`sample_row_key`]: the full primary key, any type, for sampled boundaries
//! - [`region_row_key`]: a single integer primary key, for storage region handles

use crate::core::schema::{IndexEntry, OrderingKey, TableMeta, IMPLICIT_ROW_ID};
use crate::core::value::{is_integer_type, is_numeric_type};

/// Column used for integer-range splitting, if any.
///
/// Preference order: the implicit row identity, a numeric primary key column,
/// then the first numeric column of a unique index.
pub fn select_ordering_key(meta: &TableMeta, index_entries: &[IndexEntry]) -> Option<String> {
    if meta.has_implicit_row_id {
        return Some(IMPLICIT_ROW_ID.to_string());
    }

    let numeric = |entry: &IndexEntry| is_numeric_type(meta.column_type(&entry.column_name));

    if let Some(entry) = index_entries
        .iter()
        .find(|e| e.is_primary() && numeric(e))
    {
        return Some(entry.column_name.clone());
    }

    index_entries
        .iter()
        .find(|e| !e.non_unique && numeric(e))
        .map(|e| e.column_name.clone())
}

/// Key whose values are sampled for boundaries.
///
/// Empty when the table has neither an implicit row identity nor a primary key.
pub fn sample_row_key(meta: &TableMeta, pk_columns: &[String]) -> OrderingKey {
    if meta.has_implicit_row_id {
        return OrderingKey::implicit_row_id();
    }
    OrderingKey::new(
        pk_columns.to_vec(),
        pk_columns
            .iter()
            .map(|c| meta.column_type(c).to_string())
            .collect(),
    )
}

/// Key that storage region handles map onto.
///
/// Regions are keyed by an integer handle, which is either the implicit row
/// identity or a single-column integer primary key.
pub fn region_row_key(meta: &TableMeta, pk_columns: &[String]) -> Option<OrderingKey> {
    if meta.has_implicit_row_id {
        return Some(OrderingKey::implicit_row_id());
    }
    match pk_columns {
        [only] if is_integer_type(meta.column_type(only)) => Some(OrderingKey::new(
            vec![only.clone()],
            vec![meta.column_type(only).to_string()],
        )),
        _ => None,
    }
}
