//! Persistence Sink (spec.md §4.9): the narrow, append-only interface onto
//! the relational store. All writers go through [`ranking_sink`] or
//! [`datastore_sink`]; nothing else in this crate touches SQLite directly.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::Path, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod datastore_sink;
pub mod ranking_sink;
pub mod schema;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Opens (creating if absent) a SQLite database file with the long
/// `busy_timeout` spec.md §4.9 requires ("multiple worker processes may
/// write concurrently") and WAL mode for concurrent readers.
pub async fn open_pool<P: AsRef<Path>>(
    path: P,
    busy_timeout: Duration,
) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::new()
        .filename(path.as_ref())
        .create_if_missing(true)
        .busy_timeout(busy_timeout)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await?;

    Ok(pool)
}
