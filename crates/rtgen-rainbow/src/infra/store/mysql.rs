//! MySQL store backend
//!
//! Databases are schemas on one server, created with a binary collation so
//! terminals compare byte for byte. Connections come from a pool sized to the
//! loading stage. Each insert commits on its own; the primary key is the only
//! coordination between shard tasks.

use mysql::prelude::Queryable;
use mysql::{OptsBuilder, Pool, PoolConstraints, PoolOpts, PooledConn};

use super::{InsertOutcome, Store, StoreConnection, StoreError};
use crate::config::MySqlConfig;
use crate::constants::EXTRA_CONNECTIONS;

/// Server error number for a duplicate key (`ER_DUP_ENTRY`)
const ER_DUP_ENTRY: u16 = 1062;

/// Pooled MySQL server connection factory
#[derive(Clone)]
pub struct MysqlStore {
    pool: Pool,
}

impl MysqlStore {
    /// Build the connection pool for `jobs` loading tasks and check the
    /// server answers
    ///
    /// The pool keeps `jobs / 2` idle connections and opens at most
    /// `jobs + 3`.
    pub fn open(config: &MySqlConfig, jobs: usize) -> Result<Self, StoreError> {
        let (host, port) = config.endpoint();
        let constraints =
            PoolConstraints::new(jobs / 2, jobs + EXTRA_CONNECTIONS).unwrap_or_default();
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        tracing::info!(host, port, user = %config.user, "connecting to mysql");
        let pool = Pool::new(opts)?;
        pool.get_conn()?.query_drop("SELECT 1")?;
        Ok(Self { pool })
    }
}

impl Store for MysqlStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        Ok(Box::new(MysqlConnection {
            conn: self.pool.get_conn()?,
            database: None,
        }))
    }
}

/// One pooled connection, returned to the pool on drop
pub struct MysqlConnection {
    conn: PooledConn,
    /// Selected schema, with its stored casing
    database: Option<String>,
}

impl MysqlConnection {
    fn find_database(&mut self, name: &str) -> Result<Option<String>, StoreError> {
        let found = self.conn.exec_first(
            "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE LOWER(SCHEMA_NAME) = LOWER(?)",
            (name,),
        )?;
        Ok(found)
    }
}

fn is_duplicate_key(err: &mysql::Error) -> bool {
    matches!(err, mysql::Error::MySqlError(e) if e.code == ER_DUP_ENTRY)
}

impl StoreConnection for MysqlConnection {
    fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.find_database(name)?.is_some())
    }

    fn create_database(&mut self, name: &str) -> Result<(), StoreError> {
        if self.find_database(name)?.is_some() {
            return Ok(());
        }
        self.conn.query_drop(format!(
            "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET ascii COLLATE ascii_bin",
            name
        ))?;
        Ok(())
    }

    fn select_database(&mut self, name: &str) -> Result<(), StoreError> {
        let database = self
            .find_database(name)?
            .ok_or_else(|| StoreError::UnknownDatabase(name.to_string()))?;
        self.conn.query_drop(format!("USE `{}`", database))?;
        self.database = Some(database);
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let database = self.database.as_deref().ok_or(StoreError::NoDatabase)?;
        let found: Option<String> = self.conn.exec_first(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = ? AND LOWER(TABLE_NAME) = LOWER(?)",
            (database, name),
        )?;
        Ok(found.is_some())
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn.query_drop(sql)?;
        Ok(())
    }

    /// Rows autocommit; a batch needs no transaction
    fn begin_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn insert_chain(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<InsertOutcome, StoreError> {
        let sql = format!("INSERT INTO {} (terminal, seed) VALUES (?, ?)", table);
        match self.conn.exec_drop(&sql, (terminal, seed)) {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    fn keep_smallest_seed(
        &mut self,
        table: &str,
        terminal: &str,
        seed: &str,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET seed = ? WHERE terminal = ? AND seed > ?",
            table
        );
        self.conn.exec_drop(&sql, (seed, terminal, seed))?;
        Ok(self.conn.affected_rows() > 0)
    }
}
