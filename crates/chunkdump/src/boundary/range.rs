//! Evenly spaced cut points over an integer key.

use tracing::{debug, warn};

use crate::core::schema::{BoundaryTuple, TableIdentity};
use crate::core::traits::SqlConn;
use crate::error::{DumpError, Result};
use crate::estimate::estimated_chunk_count;
use crate::query::build_min_max_query;

/// Cut points `min + k * step` for `k >= 1` up to `max`, with
/// `step = (max - min) / chunks + 1`.
///
/// `min` itself is never a cut point: no row sorts below it, so the first
/// chunk would be empty. Empty when `chunks` is 0, the range is inverted or
/// holds a single value.
pub fn integer_range_cutoffs(min: i128, max: i128, chunks: u64) -> Vec<i128> {
    if chunks == 0 || max < min {
        return Vec::new();
    }
    let step = (max - min) / i128::from(chunks) + 1;
    let mut cutoffs = Vec::new();
    let mut cutoff = min + step;
    while cutoff <= max {
        cutoffs.push(cutoff);
        cutoff += step;
    }
    cutoffs
}

/// Boundaries for `field` given an estimated `count` rows.
///
/// Empty (the table is one chunk) when the estimate is below one chunk or
/// `MIN`/`MAX` are NULL or not integers.
pub async fn integer_range_boundaries(
    conn: &mut dyn SqlConn,
    identity: &TableIdentity,
    field: &str,
    count: u64,
    rows_per_chunk: u64,
    filter: Option<&str>,
) -> Result<Vec<BoundaryTuple>> {
    let chunks = estimated_chunk_count(count, rows_per_chunk);
    if chunks == 0 {
        debug!(
            "{}: estimated {} rows is below one chunk of {}",
            identity, count, rows_per_chunk
        );
        return Ok(Vec::new());
    }

    let query = build_min_max_query(identity, field, filter);
    let rs = conn
        .query(&query)
        .await
        .map_err(|e| DumpError::boundary(identity.full_name(), e))?;

    let parse = |col: usize| -> Option<i128> { rs.text(0, col)?.trim().parse().ok() };
    let (Some(min), Some(max)) = (parse(0), parse(1)) else {
        warn!(
            "{}: MIN/MAX of `{}` are NULL or not integers, dumping as one chunk",
            identity, field
        );
        return Ok(Vec::new());
    };

    let cutoffs = integer_range_cutoffs(min, max, chunks);
    debug!(
        "{}: {} integer cut points between {} and {}",
        identity,
        cutoffs.len(),
        min,
        max
    );
    Ok(cutoffs.into_iter().map(|c| vec![c.to_string()]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{rows, text_rows, Script};

    #[test]
    fn test_integer_range_cutoffs() {
        assert_eq!(
            integer_range_cutoffs(1, 100, 10),
            vec![11, 21, 31, 41, 51, 61, 71, 81, 91]
        );
        assert_eq!(integer_range_cutoffs(0, 9, 3), vec![4, 8]);
        assert_eq!(integer_range_cutoffs(1, 2, 8), vec![2]);
        assert!(integer_range_cutoffs(5, 5, 4).is_empty());
        assert!(integer_range_cutoffs(5, 4, 4).is_empty());
        assert!(integer_range_cutoffs(0, 100, 0).is_empty());
    }

    #[test]
    fn test_integer_range_cutoffs_full_i64_span() {
        let cutoffs = integer_range_cutoffs(i64::MIN as i128, i64::MAX as i128, 2);
        assert_eq!(cutoffs, vec![0]);
    }

    #[tokio::test]
    async fn test_range_boundaries() {
        let script = Script::new();
        script.expect_query(
            "SELECT MIN(`id`),MAX(`id`) FROM `test`.`t` WHERE id > 0",
            text_rows(&["MIN(`id`)", "MAX(`id`)"], &[&["1", "100"]]),
        );
        let mut conn = script.conn();
        let tuples = integer_range_boundaries(
            &mut conn,
            &TableIdentity::new("test", "t"),
            "id",
            100,
            25,
            Some("id > 0"),
        )
        .await
        .unwrap();
        let flat: Vec<&str> = tuples.iter().map(|t| t[0].as_str()).collect();
        assert_eq!(flat, vec!["26", "51", "76"]);
    }

    #[tokio::test]
    async fn test_range_degrades_to_single_chunk() {
        let script = Script::new();
        script
            .expect_query("SELECT MIN(`id`)", rows(&["MIN", "MAX"], &[&[None, None]]))
            .expect_query("SELECT MIN(`id`)", text_rows(&["MIN", "MAX"], &[&["1.5", "9.5"]]));
        let mut conn = script.conn();
        let id = TableIdentity::new("test", "t");

        // below one chunk: no query at all
        assert!(integer_range_boundaries(&mut conn, &id, "id", 10, 100, None)
            .await
            .unwrap()
            .is_empty());
        assert!(integer_range_boundaries(&mut conn, &id, "id", 1000, 100, None)
            .await
            .unwrap()
            .is_empty());
        assert!(integer_range_boundaries(&mut conn, &id, "id", 1000, 100, None)
            .await
            .unwrap()
            .is_empty());
        script.assert_done();
    }
}
