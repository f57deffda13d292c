//! SQLite-backed key/value storage.

use rusqlite::{params, OptionalExtension};

use super::backend::StorageBackend;
use crate::db::Database;
use crate::error::StoreError;

/// Key/value backend over the `kv_store` table.
pub struct SqliteBackend {
  db: Database,
}

impl SqliteBackend {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl StorageBackend for SqliteBackend {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    self.db.with_conn(|conn| {
      let value = conn
        .query_row(
          "SELECT value FROM kv_store WHERE key = ?",
          params![key],
          |row| row.get(0),
        )
        .optional()?;
      Ok(value)
    })
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    self.db.with_conn(|conn| {
      conn.execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )?;
      Ok(())
    })
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.db.with_conn(|conn| {
      conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
      Ok(())
    })
  }
}
