//! Embedded relational store: schema, custom aggregates, transaction
//! helpers, and the query surface consumed by the capture loop, uploader,
//! and janitor binaries.

pub mod aggregates;
pub mod kv;
pub mod queries;
pub mod schema;

use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::Result;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if absent) the store file at `path`, registers the
    /// weighted aggregates, and runs the idempotent schema DDL. `path` may
    /// be `:memory:` for tests.
    pub fn open(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        aggregates::register(&conn)?;
        conn.execute_batch(schema::DDL)?;
        Ok(Store { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Deferred transaction: the default for ordinary writes (§4.6).
    pub fn deferred_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction_with_behavior(TransactionBehavior::Deferred)?)
    }

    /// Immediate transaction: used only when the caller must serialize
    /// against concurrent writers (e.g. the janitor's delete pass).
    pub fn immediate_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    pub fn optimize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_on_memory_runs_schema_and_registers_aggregates() {
        let mut store = Store::open(":memory:", Duration::from_secs(5)).unwrap();
        let tx = store.deferred_transaction().unwrap();
        tx.execute_batch("INSERT INTO keyValueStore (key, value) VALUES ('k', '1')").unwrap();
        tx.commit().unwrap();
        assert_eq!(
            kv::get(store.connection(), "k").unwrap(),
            Some(serde_json::json!(1))
        );
    }
}
