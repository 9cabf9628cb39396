// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use parley_core::ParleyError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Maps a tokio-rusqlite call failure into the storage error variant.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ParleyError {
    ParleyError::Storage {
        source: Box::new(e),
    }
}

/// Shared handle to the record database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies PRAGMAs and
    /// pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, ParleyError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(ParleyError::storage)?;
        }

        // Schema setup runs on a plain connection before the shared one opens.
        let setup_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), ParleyError> {
            let mut conn = rusqlite::Connection::open(&setup_path).map_err(ParleyError::storage)?;
            apply_pragmas(&conn, wal_mode).map_err(ParleyError::storage)?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| ParleyError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(ParleyError::storage)?;
        conn.call(move |conn| apply_pragmas(conn, wal_mode))
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "record database opened");
        Ok(Self { conn })
    }

    /// The serialized connection every query goes through.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flushes the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), ParleyError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
    if wal_mode {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(mode, "journal mode set");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}
