//! Query registry: every piece of SQL the filesystem issues lives here.
//!
//! Queries come in two kinds:
//! - **Static** queries contain only value placeholders. They are prepared
//!   once at mount time and reused for the life of the mount via the
//!   connection's statement cache, which resets and clears bindings when a
//!   statement is returned.
//! - **Dynamic** queries are templates with identifier slots (`{}`) that
//!   must be rendered and prepared per call. The returned statement is owned
//!   by the caller; dropping it finalizes it.
//!
//! Identifier slots are only ever filled with table and column names drawn
//! from the schema cache, which itself comes from the database's own
//! metadata. Path components supplied by the user (rowids, written bytes)
//! are always bound as parameters, never rendered into SQL text.

use rusqlite::{CachedStatement, Connection, Statement};

use crate::errors::FsResult;

/// Identifier for each query in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryId {
    /// Names of all user tables, in database order.
    SelectTablesName,
    /// Column name / pk flag / FK target for every column of one table.
    SelectTableInfo,
    /// One column value of one row.
    SelectAttribute,
    /// Overwrite one column value of one row.
    UpdateAttribute,
    /// Append to one column value of one row.
    UpdateAttributeAppend,
    /// All rowids of one table.
    SelectTableRowids,
}

struct QueryDef {
    id: QueryId,
    dynamic: bool,
    sql: &'static str,
}

const QUERIES: &[QueryDef] = &[
    QueryDef {
        id: QueryId::SelectTablesName,
        dynamic: false,
        sql: "SELECT name FROM sqlite_master \
              WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    },
    QueryDef {
        id: QueryId::SelectTableInfo,
        dynamic: true,
        sql: "SELECT ti.name AS column_name, \
                     ti.pk AS is_pk, \
                     fk.\"table\" AS fk_table, \
                     fk.\"to\" AS fk_column_name \
              FROM pragma_table_info('{}') ti \
              LEFT JOIN pragma_foreign_key_list('{}') fk ON ti.name = fk.\"from\"",
    },
    QueryDef {
        id: QueryId::SelectAttribute,
        dynamic: true,
        sql: "SELECT \"{}\" FROM \"{}\" WHERE rowid = ?1",
    },
    QueryDef {
        id: QueryId::UpdateAttribute,
        dynamic: true,
        sql: "UPDATE \"{}\" SET \"{}\" = ?1 WHERE rowid = ?2",
    },
    QueryDef {
        id: QueryId::UpdateAttributeAppend,
        dynamic: true,
        sql: "UPDATE \"{}\" SET \"{}\" = \"{}\" || ?1 WHERE rowid = ?2",
    },
    QueryDef {
        id: QueryId::SelectTableRowids,
        dynamic: true,
        sql: "SELECT rowid FROM \"{}\"",
    },
];

fn def(id: QueryId) -> &'static QueryDef {
    QUERIES
        .iter()
        .find(|d| d.id == id)
        .expect("every QueryId has a registry entry")
}

impl QueryId {
    /// Whether this query must be rendered per call.
    pub fn is_dynamic(self) -> bool {
        def(self).dynamic
    }

    /// The raw SQL text or template for this query.
    pub fn sql(self) -> &'static str {
        def(self).sql
    }
}

/// Statements the cache should comfortably hold: the statics plus a working
/// set of rendered dynamic queries.
const STATEMENT_CACHE_CAPACITY: usize = 32;

/// Prepare every static query. Called once at mount; a failure here fails
/// the mount.
pub fn init(conn: &Connection) -> FsResult<()> {
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    for d in QUERIES.iter().filter(|d| !d.dynamic) {
        conn.prepare_cached(d.sql)?;
    }
    Ok(())
}

/// Drop every cached statement. Called once at unmount.
pub fn cleanup(conn: &Connection) {
    conn.flush_prepared_statement_cache();
}

/// Fetch the long-lived statement for a static query, reset and ready to
/// bind. The registry retains ownership; the handle returns to the cache on
/// drop.
pub fn static_statement(conn: &Connection, id: QueryId) -> FsResult<CachedStatement<'_>> {
    assert!(!id.is_dynamic(), "{id:?} is not a static query");
    Ok(conn.prepare_cached(id.sql())?)
}

/// Render a dynamic template with the given identifier arguments and
/// prepare it. The caller owns the statement.
pub fn build_dynamic_statement<'c>(
    conn: &'c Connection,
    id: QueryId,
    args: &[&str],
) -> FsResult<Statement<'c>> {
    assert!(id.is_dynamic(), "{id:?} is not a dynamic query");
    let sql = render(id.sql(), args);
    log::debug!("dynamic query: {sql}");
    Ok(conn.prepare(&sql)?)
}

/// Build the rowid-by-key lookup for `table`: one equality per key column,
/// values bound as `?1..?n`. The key set varies per call (composite foreign
/// keys), so this query is rendered rather than templated.
pub fn build_rowid_lookup<'c>(
    conn: &'c Connection,
    table: &str,
    key_columns: &[&str],
) -> FsResult<Statement<'c>> {
    let mut sql = format!("SELECT rowid FROM \"{table}\" WHERE ");
    for (i, column) in key_columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str(&format!("\"{column}\" = ?{}", i + 1));
    }
    log::debug!("rowid lookup: {sql}");
    Ok(conn.prepare(&sql)?)
}

fn render(template: &str, args: &[&str]) -> String {
    let mut sql = String::with_capacity(template.len() + args.len() * 16);
    let mut rest = template;
    for arg in args {
        match rest.split_once("{}") {
            Some((head, tail)) => {
                sql.push_str(head);
                sql.push_str(arg);
                rest = tail;
            }
            None => break,
        }
    }
    sql.push_str(rest);
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_and_dynamic_kinds() {
        assert!(!QueryId::SelectTablesName.is_dynamic());
        assert!(QueryId::SelectTableInfo.is_dynamic());
        assert!(QueryId::SelectAttribute.is_dynamic());
        assert!(QueryId::UpdateAttribute.is_dynamic());
        assert!(QueryId::UpdateAttributeAppend.is_dynamic());
        assert!(QueryId::SelectTableRowids.is_dynamic());
    }

    #[test]
    fn render_select_attribute() {
        let sql = render(QueryId::SelectAttribute.sql(), &["item", "orders"]);
        assert_eq!(sql, "SELECT \"item\" FROM \"orders\" WHERE rowid = ?1");
    }

    #[test]
    fn render_append_names_column_twice() {
        let sql = render(
            QueryId::UpdateAttributeAppend.sql(),
            &["orders", "item", "item"],
        );
        assert_eq!(
            sql,
            "UPDATE \"orders\" SET \"item\" = \"item\" || ?1 WHERE rowid = ?2"
        );
    }

    #[test]
    fn rowid_lookup_joins_keys_with_and() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a, b)").unwrap();
        let stmt = build_rowid_lookup(&conn, "t", &["a", "b"]).unwrap();
        assert_eq!(stmt.parameter_count(), 2);
    }

    #[test]
    fn init_prepares_statics_against_live_connection() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        let mut stmt = static_statement(&conn, QueryId::SelectTablesName).unwrap();
        let names: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(names.is_empty());
        cleanup(&conn);
    }
}
