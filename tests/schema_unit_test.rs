//! Schema cache construction against real SQLite databases.

use rusqlite::Connection;
use sqlfs::db::DbGateway;
use sqlfs::schema::{ColumnClass, DbSchema};

fn build_schema(sql: &str) -> DbSchema {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(sql).unwrap();
    let gateway = DbGateway::new(conn);
    gateway.init().unwrap();
    DbSchema::build(&gateway).unwrap()
}

#[test]
fn tables_appear_in_database_order() {
    let schema = build_schema(
        "CREATE TABLE zebra (id INTEGER PRIMARY KEY);
         CREATE TABLE apple (id INTEGER PRIMARY KEY);",
    );
    let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["zebra", "apple"]);
}

#[test]
fn internal_sqlite_tables_are_hidden() {
    let schema = build_schema(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT);
         CREATE INDEX t_label ON t(label);",
    );
    assert_eq!(schema.len(), 1);
    assert!(schema.table("t").is_some());
}

#[test]
fn columns_partition_into_pk_attr_fk() {
    let schema = build_schema(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (
             id INTEGER PRIMARY KEY,
             customer_id INTEGER REFERENCES customers(id),
             item TEXT,
             qty INTEGER
         );",
    );
    let orders = schema.table("orders").unwrap();
    assert_eq!(orders.pk, vec!["id"]);
    assert_eq!(orders.attr, vec!["item", "qty"]);
    assert_eq!(orders.fks.len(), 1);
    assert_eq!(orders.fks[0].from, "customer_id");
    assert_eq!(orders.fks[0].referenced_table, "customers");
    assert_eq!(orders.fks[0].referenced_column, "id");

    assert_eq!(orders.column_class("id"), Some(ColumnClass::PrimaryKey));
    assert_eq!(orders.column_class("qty"), Some(ColumnClass::Attribute));
    assert_eq!(
        orders.column_class("customer_id"),
        Some(ColumnClass::ForeignKey)
    );
}

#[test]
fn composite_primary_keys_keep_declaration_order() {
    let schema = build_schema(
        "CREATE TABLE airports (
             code TEXT,
             region TEXT,
             name TEXT,
             PRIMARY KEY (code, region)
         );",
    );
    let airports = schema.table("airports").unwrap();
    assert_eq!(airports.pk, vec!["code", "region"]);
    assert_eq!(airports.attr, vec!["name"]);
}

#[test]
fn composite_fk_columns_group_by_referenced_table() {
    let schema = build_schema(
        "CREATE TABLE airports (
             code TEXT,
             region TEXT,
             PRIMARY KEY (code, region)
         );
         CREATE TABLE carriers (id INTEGER PRIMARY KEY);
         CREATE TABLE flights (
             id INTEGER PRIMARY KEY,
             carrier_id INTEGER REFERENCES carriers(id),
             dest_code TEXT,
             dest_region TEXT,
             FOREIGN KEY (dest_code, dest_region) REFERENCES airports(code, region)
         );",
    );
    let flights = schema.table("flights").unwrap();
    assert_eq!(flights.fks.len(), 3);

    let airport_fks: Vec<(&str, &str)> = flights
        .fks_referencing("airports")
        .iter()
        .map(|fk| (fk.from.as_str(), fk.referenced_column.as_str()))
        .collect();
    assert_eq!(
        airport_fks,
        vec![("dest_code", "code"), ("dest_region", "region")]
    );

    let carrier_fks = flights.fks_referencing("carriers");
    assert_eq!(carrier_fks.len(), 1);
    assert_eq!(carrier_fks[0].from, "carrier_id");
}

#[test]
fn empty_database_builds_an_empty_cache() {
    let schema = build_schema("");
    assert!(schema.is_empty());
    assert!(schema.table("anything").is_none());
}
