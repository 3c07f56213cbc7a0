//! SQLite-backed storage gateway and connection bootstrap.
//!
//! # Responsibility
//! - Open file or in-memory SQLite stores with required pragmas.
//! - Apply schema migrations before returning a usable gateway.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Returned stores have migrations fully applied.
//! - Record bodies are stored as JSON text and validated on read.

use super::migrations::apply_migrations;
use super::{Partition, StorageGateway, StoreError, StoreResult};
use crate::model::card::JsonMap;
use log::{error, info};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::{Duration, Instant};

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Connection,
}

/// Opens a store file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(path: impl AsRef<Path>) -> StoreResult<SqliteStore> {
    let started_at = Instant::now();
    info!("event=store_open module=store status=start mode=file");

    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=store status=error mode=file duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    finish_open(conn, started_at, "file")
}

/// Opens an in-memory store and applies all pending migrations.
pub fn open_store_in_memory() -> StoreResult<SqliteStore> {
    let started_at = Instant::now();
    info!("event=store_open module=store status=start mode=memory");

    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=store status=error mode=memory duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    finish_open(conn, started_at, "memory")
}

fn finish_open(mut conn: Connection, started_at: Instant, mode: &str) -> StoreResult<SqliteStore> {
    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=store_open module=store status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(SqliteStore { conn })
        }
        Err(err) => {
            error!(
                "event=store_open module=store status=error mode={} duration_ms={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}

fn parse_body(id: &str, text: &str) -> StoreResult<JsonMap> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Corrupt {
            id: id.to_string(),
            message: "body is not a JSON object".to_string(),
        }),
        Err(err) => Err(StoreError::Corrupt {
            id: id.to_string(),
            message: err.to_string(),
        }),
    }
}

fn body_text(body: &JsonMap) -> String {
    serde_json::Value::Object(body.clone()).to_string()
}

impl StorageGateway for SqliteStore {
    fn get(&self, id: &str) -> StoreResult<Option<JsonMap>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE id = ?1;")?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            return Ok(Some(parse_body(id, &text)?));
        }
        Ok(None)
    }

    fn save(&mut self, id: &str, body: &JsonMap) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO records (id, partition, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
                partition = excluded.partition,
                body = excluded.body,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![id, Partition::for_id(id).as_str(), body_text(body)],
        )?;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM records WHERE id = ?1;", [id])?;
        Ok(())
    }

    fn list(&self, partition: Partition) -> StoreResult<Vec<JsonMap>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, body FROM records WHERE partition = ?1 ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([partition.as_str()])?;
        let mut bodies = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let text: String = row.get(1)?;
            bodies.push(parse_body(&id, &text)?);
        }
        Ok(bodies)
    }

    fn list_all(&self) -> StoreResult<Vec<JsonMap>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM records ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut bodies = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let text: String = row.get(1)?;
            bodies.push(parse_body(&id, &text)?);
        }
        Ok(bodies)
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.conn.execute("DELETE FROM records;", [])?;
        Ok(())
    }
}
