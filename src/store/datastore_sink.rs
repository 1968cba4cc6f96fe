// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sqlx::SqlitePool;

use crate::{rpc::types::DataStoreMeta, store::PersistenceError};

/// Persists a batch of metadata rows (and their tags/ratings/permission
/// recipients) in one transaction (spec.md §3 atomicity invariant).
pub async fn persist_meta_batch(
    pool: &SqlitePool,
    game: &str,
    metas: &[DataStoreMeta],
) -> Result<(), PersistenceError> {
    let mut tx = pool.begin().await?;

    for meta in metas {
        sqlx::query(
            "INSERT OR REPLACE INTO datastore_meta (
                game, data_id, owner_id, size, name, data_type, meta_binary,
                permission_mask, delete_permission_mask, create_time, update_time,
                referred_time, expire_time, period, status, referred_count,
                refer_data_id, flag
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game)
        .bind(meta.data_id.to_string())
        .bind(&meta.owner_id)
        .bind(meta.size as i64)
        .bind(&meta.name)
        .bind(i64::from(meta.data_type))
        .bind(meta.meta_binary.clone())
        .bind(i64::from(meta.permission.mask))
        .bind(i64::from(meta.delete_permission.mask))
        .bind(meta.create_time.timestamp())
        .bind(meta.update_time.timestamp())
        .bind(meta.referred_time.timestamp())
        .bind(meta.expire_time.map(|t| t.timestamp()))
        .bind(i64::from(meta.period))
        .bind(i64::from(meta.status))
        .bind(i64::from(meta.referred_count))
        .bind(meta.refer_data_id.to_string())
        .bind(i64::from(meta.flag))
        .execute(&mut *tx)
        .await?;

        for tag in &meta.tags {
            sqlx::query(
                "INSERT INTO datastore_meta_tag (game, data_id, tag) VALUES (?, ?, ?)",
            )
            .bind(game)
            .bind(meta.data_id.to_string())
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }

        for rating in &meta.ratings {
            sqlx::query(
                "INSERT INTO datastore_meta_rating (
                    game, data_id, slot, total_value, count, initial_value
                ) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(game)
            .bind(meta.data_id.to_string())
            .bind(i64::from(rating.slot))
            .bind(rating.total)
            .bind(i64::from(rating.count))
            .bind(rating.initial)
            .execute(&mut *tx)
            .await?;
        }

        for recipient in &meta.permission.recipients {
            sqlx::query(
                "INSERT INTO datastore_permission_recipients (
                    game, data_id, is_delete, recipient
                ) VALUES (?, ?, 0, ?)",
            )
            .bind(game)
            .bind(meta.data_id.to_string())
            .bind(recipient)
            .execute(&mut *tx)
            .await?;
        }
        for recipient in &meta.delete_permission.recipients {
            sqlx::query(
                "INSERT INTO datastore_permission_recipients (
                    game, data_id, is_delete, recipient
                ) VALUES (?, ?, 1, ?)",
            )
            .bind(game)
            .bind(meta.data_id.to_string())
            .bind(recipient)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Persists one blob fetch outcome: a row with `data` set on success, or
/// with only `error` set (spec.md §4.7).
pub async fn persist_blob(
    pool: &SqlitePool,
    game: &str,
    data_id: u64,
    url: Option<&str>,
    data: Option<&[u8]>,
    error: Option<&str>,
) -> Result<(), PersistenceError> {
    sqlx::query(
        "INSERT OR REPLACE INTO datastore_data (game, data_id, error, url, data) VALUES \
         (?, ?, ?, ?, ?)",
    )
    .bind(game)
    .bind(data_id.to_string())
    .bind(error)
    .bind(url)
    .bind(data)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records a persistence-slot mapping discovered by the
/// Metadata-By-Persistence Scanner (spec.md §4.8).
pub async fn persist_mapping(
    pool: &SqlitePool,
    game: &str,
    owner_id: &str,
    persistence_id: u8,
    data_id: u64,
) -> Result<(), PersistenceError> {
    sqlx::query(
        "INSERT OR REPLACE INTO datastore_persistent (
            game, owner_id, persistence_id, data_id
        ) VALUES (?, ?, ?, ?)",
    )
    .bind(game)
    .bind(owner_id)
    .bind(i64::from(persistence_id))
    .bind(data_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Highest persisted `data_id` for this title, used by the Range Finder's
/// idempotent-resume step (spec.md §4.5 step 5).
pub async fn max_data_id(pool: &SqlitePool, game: &str) -> Result<Option<u64>, PersistenceError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT data_id FROM datastore_meta WHERE game = ? ORDER BY CAST(data_id AS INTEGER) DESC LIMIT 1")
            .bind(game)
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|(id,)| id.parse().ok()))
}

/// Data-ids with a persisted meta row but no `datastore_data` row yet,
/// used by the Harvest Coordinator to pre-fill the blob queue on restart
/// (spec.md §4.10).
pub async fn unfetched_data_ids(
    pool: &SqlitePool,
    game: &str,
) -> Result<Vec<u64>, PersistenceError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT m.data_id FROM datastore_meta m
         LEFT JOIN datastore_data d ON d.game = m.game AND d.data_id = m.data_id
         WHERE m.game = ? AND m.size > 0 AND d.data_id IS NULL",
    )
    .bind(game)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(|(id,)| id.parse().ok()).collect())
}

/// Distinct owner-principals already harvested for this title, the input
/// set for the Metadata-By-Persistence Scanner (spec.md §4.8).
pub async fn distinct_owner_ids(
    pool: &SqlitePool,
    game: &str,
) -> Result<Vec<String>, PersistenceError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT owner_id FROM datastore_meta WHERE game = ?")
            .bind(game)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        rpc::types::{Permission, Rating},
        store::{open_pool, schema::migrate_datastore},
    };

    async fn fixture_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(dir.path().join("datastore.db"), Duration::from_secs(5))
            .await
            .expect("open pool");
        migrate_datastore(&pool).await.expect("migrate");
        (dir, pool)
    }

    fn meta(data_id: u64, owner_id: &str, size: u64) -> DataStoreMeta {
        let now = Utc::now();
        DataStoreMeta {
            data_id,
            owner_id: owner_id.to_string(),
            size,
            name: "object".to_string(),
            data_type: 1,
            meta_binary: vec![1, 2, 3],
            permission: Permission {
                mask: 0,
                recipients: vec!["100".to_string()],
            },
            delete_permission: Permission::default(),
            create_time: now,
            update_time: now,
            referred_time: now,
            expire_time: None,
            period: 0,
            status: 0,
            referred_count: 0,
            refer_data_id: 0,
            flag: 0,
            tags: vec!["tag-a".to_string()],
            ratings: vec![Rating {
                slot: 0,
                total: 10,
                count: 2,
                initial: 0,
            }],
        }
    }

    #[tokio::test]
    async fn persists_meta_with_tags_and_ratings() {
        let (_dir, pool) = fixture_pool().await;
        persist_meta_batch(&pool, "game-a", &[meta(42, "100", 128)])
            .await
            .expect("persist meta");

        let max = max_data_id(&pool, "game-a").await.expect("query");
        assert_eq!(max, Some(42));

        let owners = distinct_owner_ids(&pool, "game-a").await.expect("owners");
        assert_eq!(owners, vec!["100".to_string()]);
    }

    #[tokio::test]
    async fn unfetched_data_ids_excludes_already_fetched() {
        let (_dir, pool) = fixture_pool().await;
        persist_meta_batch(&pool, "game-a", &[meta(1, "100", 10), meta(2, "100", 20)])
            .await
            .expect("persist meta");
        persist_blob(&pool, "game-a", 1, Some("https://example.test"), Some(&[1, 2]), None)
            .await
            .expect("persist blob");

        let mut unfetched = unfetched_data_ids(&pool, "game-a").await.expect("query");
        unfetched.sort_unstable();
        assert_eq!(unfetched, vec![2]);
    }

    #[tokio::test]
    async fn persist_blob_records_error_without_data() {
        let (_dir, pool) = fixture_pool().await;
        persist_blob(&pool, "game-a", 5, None, None, Some("timeout"))
            .await
            .expect("persist blob error");

        let row: (Option<String>, Option<Vec<u8>>) =
            sqlx::query_as("SELECT error, data FROM datastore_data WHERE game = ? AND data_id = ?")
                .bind("game-a")
                .bind("5")
                .fetch_one(&pool)
                .await
                .expect("fetch row");
        assert_eq!(row.0.as_deref(), Some("timeout"));
        assert!(row.1.is_none());
    }
}
