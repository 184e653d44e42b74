//! Connection bootstrap for SQLite.
//!
//! # Invariants
//! - Returned connections have the configured busy timeout applied.
//! - `foreign_keys` pragma mirrors `ConnectionOptions::foreign_keys`.

use super::DbResult;
use crate::config::ConnectionOptions;
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

/// Opens and configures one connection.
///
/// # Side effects
/// - Creates the database file when it does not exist yet.
/// - Emits `db_open` logging events with duration and status.
pub fn open_connection(options: &ConnectionOptions) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = if options.is_memory() { "memory" } else { "file" };
    info!("event=db_open module=db status=start mode={mode}");

    let result = if options.is_memory() {
        Connection::open_in_memory()
    } else {
        Connection::open(&options.path)
    };

    let conn = match result.and_then(|conn| configure(&conn, options).map(|()| conn)) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn configure(conn: &Connection, options: &ConnectionOptions) -> rusqlite::Result<()> {
    let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    Ok(())
}
