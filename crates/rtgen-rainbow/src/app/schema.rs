//! Store schema provisioning
//!
//! Idempotent: re-running against an existing database is a no-op.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::constants::TABLE_PREFIX;
use crate::error::{Error, Result};
use crate::infra::store::{StoreConnection, StoreError};

/// Table holding chains of a given password length
pub fn table_name(len: usize) -> String {
    format!("{}{}", TABLE_PREFIX, len)
}

/// `CREATE TABLE` statement for a password length
pub fn create_table_sql(len: usize) -> String {
    format!(
        "CREATE TABLE {} (terminal CHAR({}) NOT NULL PRIMARY KEY, seed CHAR({}) NOT NULL)",
        table_name(len),
        len,
        len
    )
}

/// Ensure the database and one table per length exist
///
/// Leaves `conn` pointed at the database. Returns the table name for every
/// length in `lengths`.
pub fn ensure_schema(
    conn: &mut dyn StoreConnection,
    database: &str,
    lengths: RangeInclusive<usize>,
) -> Result<BTreeMap<usize, String>> {
    let schema_err = |object: &str| {
        let object = object.to_string();
        move |source: StoreError| Error::Schema { object, source }
    };

    if !conn.database_exists(database).map_err(schema_err(database))? {
        tracing::info!(database, "creating database");
        conn.create_database(database)
            .map_err(schema_err(database))?;
    }
    conn.select_database(database)
        .map_err(schema_err(database))?;

    let mut tables = BTreeMap::new();
    for len in lengths {
        let table = table_name(len);
        if !conn.table_exists(&table).map_err(schema_err(&table))? {
            tracing::info!(table = %table, "creating table");
            conn.execute(&create_table_sql(len))
                .map_err(schema_err(&table))?;
        }
        tables.insert(len, table);
    }

    Ok(tables)
}
