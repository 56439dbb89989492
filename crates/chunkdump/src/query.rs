//! SQL text for chunk queries and the planning probes around them.
//!
//! Every builder here is pure. Identifiers go through [`crate::core::identifier`];
//! the user filter and partition predicates are spliced in verbatim.

use crate::core::identifier::{escape, qualify, quote, quote_all};
use crate::core::schema::{DatabaseTables, OrderingKey, TableIdentity, TableType};

/// Final chunk query.
///
/// `SELECT <fields> FROM `db`.`t` [PARTITION(`p`)] [WHERE ...] [ORDER BY ...]`.
/// An empty projection (every column generated) is rendered as `''` so the
/// statement stays valid.
pub fn build_select_query(
    identity: &TableIdentity,
    fields: &str,
    where_clause: &str,
    order_by: &str,
) -> String {
    let fields = if fields.is_empty() { "''" } else { fields };
    let mut query = format!("SELECT {} FROM {}", fields, identity.qualified());

    if let Some(partition) = &identity.partition {
        query.push_str(&format!(" PARTITION({})", quote(partition)));
    }
    if !where_clause.is_empty() {
        query.push(' ');
        query.push_str(where_clause);
    }
    if !order_by.is_empty() {
        query.push(' ');
        query.push_str(order_by);
    }
    query
}

/// Combine the user filter with a chunk predicate into a `WHERE` clause.
///
/// When both are present each side is parenthesized, since chunk predicates
/// are built from top-level `or(...)` alternatives.
pub fn build_where_condition(filter: Option<&str>, predicate: &str) -> String {
    let filter = filter.map(str::trim).filter(|f| !f.is_empty());
    match (filter, predicate.is_empty()) {
        (None, true) => String::new(),
        (Some(f), true) => format!("WHERE {}", f),
        (None, false) => format!("WHERE {}", predicate),
        (Some(f), false) => format!("WHERE ({}) AND ({})", f, predicate),
    }
}

/// `ORDER BY `a`,`b``, or empty when there are no columns.
pub fn build_order_by_clause<S: AsRef<str>>(columns: &[S]) -> String {
    if columns.is_empty() {
        return String::new();
    }
    format!("ORDER BY {}", quote_all(columns).join(","))
}

/// Region-sampled key tuples in key order.
pub fn build_sample_query(identity: &TableIdentity, key: &OrderingKey) -> String {
    let cols = key.column_list();
    format!(
        "SELECT {} FROM {} TABLESAMPLE REGIONS() ORDER BY {}",
        cols,
        qualify(&identity.database, &identity.table),
        cols
    )
}

/// `LOCK TABLES ... READ` over every base table not excluded by `is_blocked`.
///
/// Views are skipped; locking a view locks its base tables, which are listed
/// anyway. Returns an empty string when nothing is left to lock.
pub fn build_lock_tables_sql<F>(tables: &DatabaseTables, is_blocked: F) -> String
where
    F: Fn(&str, &str) -> bool,
{
    let entries: Vec<String> = tables
        .iter()
        .flat_map(|(database, infos)| {
            infos
                .iter()
                .filter(|info| info.table_type == TableType::Base)
                .filter(|info| !is_blocked(database, &info.name))
                .map(move |info| format!("{} READ", qualify(database, &info.name)))
        })
        .collect();

    if entries.is_empty() {
        String::new()
    } else {
        format!("LOCK TABLES {}", entries.join(","))
    }
}

/// `SELECT MIN(`f`),MAX(`f`) FROM `db`.`t`` with the user filter appended.
pub fn build_min_max_query(identity: &TableIdentity, field: &str, filter: Option<&str>) -> String {
    let quoted = quote(field);
    let mut query = format!(
        "SELECT MIN({}),MAX({}) FROM {}",
        quoted,
        quoted,
        qualify(&identity.database, &identity.table)
    );
    append_filter(&mut query, filter);
    query
}

/// Planner estimate query for a table.
///
/// An empty or `*` field selects every column.
pub fn build_explain_query(identity: &TableIdentity, field: &str, filter: Option<&str>) -> String {
    let field = field.trim();
    let projection = if field.is_empty() || field == "*" {
        "*".to_string()
    } else {
        format!("`{}`", escape(field))
    };
    let mut query = format!(
        "EXPLAIN SELECT {} FROM {}",
        projection,
        qualify(&identity.database, &identity.table)
    );
    append_filter(&mut query, filter);
    query
}

fn append_filter(query: &mut String, filter: Option<&str>) {
    if let Some(f) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        query.push_str(" WHERE ");
        query.push_str(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TableInfo;

    fn ident() -> TableIdentity {
        TableIdentity::new("test", "t")
    }

    #[test]
    fn test_build_select_query_plain() {
        assert_eq!(build_select_query(&ident(), "*", "", ""), "SELECT * FROM `test`.`t`");
    }

    #[test]
    fn test_build_select_query_segment_order() {
        let q = build_select_query(
            &ident().with_partition("p0"),
            "`id`,`name`",
            "WHERE `id`<10",
            "ORDER BY `id`",
        );
        assert_eq!(
            q,
            "SELECT `id`,`name` FROM `test`.`t` PARTITION(`p0`) WHERE `id`<10 ORDER BY `id`"
        );
    }

    #[test]
    fn test_build_select_query_empty_projection() {
        assert_eq!(build_select_query(&ident(), "", "", ""), "SELECT '' FROM `test`.`t`");
    }

    #[test]
    fn test_build_select_query_escapes_names() {
        let id = TableIdentity::new("te`st", "t`1").with_partition("p`0");
        assert_eq!(
            build_select_query(&id, "*", "", ""),
            "SELECT * FROM `te``st`.`t``1` PARTITION(`p``0`)"
        );
    }

    #[test]
    fn test_build_where_condition() {
        assert_eq!(build_where_condition(None, ""), "");
        assert_eq!(build_where_condition(Some("a > 1"), ""), "WHERE a > 1");
        assert_eq!(build_where_condition(None, "`id`<5"), "WHERE `id`<5");
        assert_eq!(
            build_where_condition(Some("a > 1"), "`a`<1 or(`a`=1 and `b`<2)"),
            "WHERE (a > 1) AND (`a`<1 or(`a`=1 and `b`<2))"
        );
        assert_eq!(build_where_condition(Some("   "), "`id`<5"), "WHERE `id`<5");
    }

    #[test]
    fn test_build_order_by_clause() {
        assert_eq!(build_order_by_clause::<&str>(&[]), "");
        assert_eq!(build_order_by_clause(&["id"]), "ORDER BY `id`");
        assert_eq!(build_order_by_clause(&["id", "na`me"]), "ORDER BY `id`,`na``me`");
    }

    #[test]
    fn test_build_sample_query() {
        let key = OrderingKey::new(
            vec!["a".into(), "b".into()],
            vec!["INT".into(), "VARCHAR".into()],
        );
        assert_eq!(
            build_sample_query(&ident(), &key),
            "SELECT `a`,`b` FROM `test`.`t` TABLESAMPLE REGIONS() ORDER BY `a`,`b`"
        );
    }

    #[test]
    fn test_build_lock_tables_sql() {
        let mut tables = DatabaseTables::new();
        tables.insert(
            "db1".to_string(),
            vec![
                TableInfo::new("t1", 0, TableType::Base),
                TableInfo::new("v1", 0, TableType::View),
                TableInfo::new("t2", 0, TableType::Base),
            ],
        );
        tables.insert(
            "db2".to_string(),
            vec![TableInfo::new("t3", 0, TableType::Base)],
        );

        assert_eq!(
            build_lock_tables_sql(&tables, |_, _| false),
            "LOCK TABLES `db1`.`t1` READ,`db1`.`t2` READ,`db2`.`t3` READ"
        );
        assert_eq!(
            build_lock_tables_sql(&tables, |db, t| db == "db1" && t == "t2"),
            "LOCK TABLES `db1`.`t1` READ,`db2`.`t3` READ"
        );
        assert_eq!(build_lock_tables_sql(&tables, |_, _| true), "");
    }

    #[test]
    fn test_build_min_max_query() {
        assert_eq!(
            build_min_max_query(&ident(), "id", None),
            "SELECT MIN(`id`),MAX(`id`) FROM `test`.`t`"
        );
        assert_eq!(
            build_min_max_query(&ident(), "id", Some("k > 3")),
            "SELECT MIN(`id`),MAX(`id`) FROM `test`.`t` WHERE k > 3"
        );
    }

    #[test]
    fn test_build_explain_query() {
        assert_eq!(
            build_explain_query(&ident(), "", None),
            "EXPLAIN SELECT * FROM `test`.`t`"
        );
        assert_eq!(
            build_explain_query(&ident(), " * ", None),
            "EXPLAIN SELECT * FROM `test`.`t`"
        );
        assert_eq!(
            build_explain_query(&ident(), "id", Some("id > 1")),
            "EXPLAIN SELECT `id` FROM `test`.`t` WHERE id > 1"
        );
    }
}
