//! Cache generation storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{CachedResponse, Response};
use crate::db::Database;
use crate::error::StoreError;

/// Trait for cache generation backends.
pub trait GenerationStorage: Send + Sync {
  /// Store one entry, creating the generation if needed.
  fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), StoreError>;

  /// Store every entry in one transaction; either all land or none do.
  fn put_all(&self, generation: &str, entries: &[(String, Response)]) -> Result<(), StoreError>;

  /// Find an entry by key, preferring `preferred`, then the oldest generation.
  fn lookup(&self, key: &str, preferred: &str) -> Result<Option<CachedResponse>, StoreError>;

  /// Names of all generations, oldest first.
  fn generation_names(&self) -> Result<Vec<String>, StoreError>;

  /// Delete a generation and its entries. Returns whether it existed.
  fn delete_generation(&self, name: &str) -> Result<bool, StoreError>;

  /// Number of entries held by a generation.
  fn entry_count(&self, generation: &str) -> Result<usize, StoreError>;
}

/// SQLite-based generation storage.
pub struct SqliteGenerationStorage {
  db: Database,
}

impl SqliteGenerationStorage {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

fn ensure_generation(conn: &Connection, name: &str) -> Result<(), StoreError> {
  conn.execute(
    "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?, datetime('now'))",
    params![name],
  )?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &str,
  response: &Response,
) -> Result<(), StoreError> {
  conn.execute(
    "INSERT OR REPLACE INTO cache_entries (generation, request_key, url, status, content_type, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      key,
      response.url,
      response.status,
      response.content_type,
      response.body
    ],
  )?;
  Ok(())
}

impl GenerationStorage for SqliteGenerationStorage {
  fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), StoreError> {
    self.db.with_conn(|conn| {
      let tx = conn.transaction()?;
      ensure_generation(&tx, generation)?;
      insert_entry(&tx, generation, key, response)?;
      tx.commit()?;
      Ok(())
    })
  }

  fn put_all(&self, generation: &str, entries: &[(String, Response)]) -> Result<(), StoreError> {
    self.db.with_conn(|conn| {
      // Dropping the transaction without commit rolls everything back
      let tx = conn.transaction()?;
      ensure_generation(&tx, generation)?;
      for (key, response) in entries {
        insert_entry(&tx, generation, key, response)?;
      }
      tx.commit()?;
      Ok(())
    })
  }

  fn lookup(&self, key: &str, preferred: &str) -> Result<Option<CachedResponse>, StoreError> {
    self.db.with_conn(|conn| {
      let row = conn
        .query_row(
          "SELECT e.url, e.status, e.content_type, e.body, e.generation, e.cached_at
           FROM cache_entries e
           INNER JOIN cache_generations g ON g.name = e.generation
           WHERE e.request_key = ?
           ORDER BY (e.generation = ?) DESC, g.created_at, g.name
           LIMIT 1",
          params![key, preferred],
          |row| {
            Ok((
              Response {
                url: row.get(0)?,
                status: row.get(1)?,
                content_type: row.get(2)?,
                body: row.get(3)?,
              },
              row.get::<_, String>(4)?,
              row.get::<_, String>(5)?,
            ))
          },
        )
        .optional()?;

      match row {
        Some((response, generation, cached_at)) => Ok(Some(CachedResponse {
          response,
          generation,
          cached_at: parse_datetime(&cached_at)?,
        })),
        None => Ok(None),
      }
    })
  }

  fn generation_names(&self) -> Result<Vec<String>, StoreError> {
    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare("SELECT name FROM cache_generations ORDER BY created_at, name")?;
      let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
      Ok(names)
    })
  }

  fn delete_generation(&self, name: &str) -> Result<bool, StoreError> {
    self.db.with_conn(|conn| {
      let tx = conn.transaction()?;
      tx.execute(
        "DELETE FROM cache_entries WHERE generation = ?",
        params![name],
      )?;
      let deleted = tx.execute("DELETE FROM cache_generations WHERE name = ?", params![name])?;
      tx.commit()?;
      Ok(deleted > 0)
    })
  }

  fn entry_count(&self, generation: &str) -> Result<usize, StoreError> {
    self.db.with_conn(|conn| {
      let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )?;
      Ok(count as usize)
    })
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Unavailable(format!("bad timestamp '{}': {}", s, e)))
}
