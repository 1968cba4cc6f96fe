// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sqlx::SqlitePool;

use crate::store::PersistenceError;

/// DDL for `ranking.db` (spec.md §6 "Persistent state layout"). Indexes on
/// `(game, category)` and `(rank)` are the ones the spec names explicitly.
const RANKING_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ranking (
        game TEXT NOT NULL,
        id TEXT NOT NULL,
        pid TEXT NOT NULL,
        rank INTEGER NOT NULL,
        category INTEGER NOT NULL,
        score INTEGER NOT NULL,
        param TEXT,
        data BLOB,
        update_time INTEGER,
        PRIMARY KEY (game, category, rank)
    )",
    "CREATE INDEX IF NOT EXISTS idx_ranking_game_category ON ranking (game, category)",
    "CREATE INDEX IF NOT EXISTS idx_ranking_rank ON ranking (rank)",
    "CREATE TABLE IF NOT EXISTS ranking_group (
        game TEXT NOT NULL,
        id TEXT NOT NULL,
        category INTEGER NOT NULL,
        rank INTEGER NOT NULL,
        ranking_index INTEGER NOT NULL,
        ranking_group INTEGER NOT NULL,
        FOREIGN KEY (game, category, rank) REFERENCES ranking (game, category, rank)
    )",
];

/// DDL for `datastore.db` (spec.md §6, §3 entity attributes).
const DATASTORE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS datastore_meta (
        game TEXT NOT NULL,
        data_id TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        size INTEGER NOT NULL,
        name TEXT,
        data_type INTEGER,
        meta_binary BLOB,
        permission_mask INTEGER,
        delete_permission_mask INTEGER,
        create_time INTEGER,
        update_time INTEGER,
        referred_time INTEGER,
        expire_time INTEGER,
        period INTEGER,
        status INTEGER,
        referred_count INTEGER,
        refer_data_id TEXT,
        flag INTEGER,
        PRIMARY KEY (game, data_id)
    )",
    "CREATE TABLE IF NOT EXISTS datastore_meta_tag (
        game TEXT NOT NULL,
        data_id TEXT NOT NULL,
        tag TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS datastore_meta_rating (
        game TEXT NOT NULL,
        data_id TEXT NOT NULL,
        slot INTEGER NOT NULL,
        total_value INTEGER NOT NULL,
        count INTEGER NOT NULL,
        initial_value INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS datastore_data (
        game TEXT NOT NULL,
        data_id TEXT NOT NULL,
        error TEXT,
        url TEXT,
        data BLOB,
        PRIMARY KEY (game, data_id)
    )",
    "CREATE TABLE IF NOT EXISTS datastore_permission_recipients (
        game TEXT NOT NULL,
        data_id TEXT NOT NULL,
        is_delete INTEGER NOT NULL,
        recipient TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS datastore_persistent (
        game TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        persistence_id INTEGER NOT NULL,
        data_id TEXT NOT NULL,
        PRIMARY KEY (game, owner_id, persistence_id)
    )",
];

async fn apply(pool: &SqlitePool, statements: &[&str]) -> Result<(), PersistenceError> {
    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

pub async fn migrate_ranking(pool: &SqlitePool) -> Result<(), PersistenceError> {
    apply(pool, RANKING_SCHEMA).await
}

pub async fn migrate_datastore(pool: &SqlitePool) -> Result<(), PersistenceError> {
    apply(pool, DATASTORE_SCHEMA).await
}
