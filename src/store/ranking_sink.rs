// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sqlx::SqlitePool;

use crate::{rpc::types::RankingEntry, store::PersistenceError};

/// The highest `(rank, unique_id, principal_id)` already stored for a
/// (title, category), used by S1 Resume check to jump straight to S4
/// (spec.md §4.3 S1).
#[derive(Debug, Clone)]
pub struct RankingWatermark {
    pub rank: u32,
    pub unique_id: u64,
    pub principal_id: String,
}

/// Current row-count for (title, category), compared against the
/// server-claimed `total` at S1.
pub async fn row_count(
    pool: &SqlitePool,
    game: &str,
    category: u32,
) -> Result<i64, PersistenceError> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM ranking WHERE game = ? AND category = ?")
            .bind(game)
            .bind(i64::from(category))
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn highest_watermark(
    pool: &SqlitePool,
    game: &str,
    category: u32,
) -> Result<Option<RankingWatermark>, PersistenceError> {
    let row: Option<(i64, String, String)> = sqlx::query_as(
        "SELECT rank, id, pid FROM ranking WHERE game = ? AND category = ? ORDER BY rank DESC \
         LIMIT 1",
    )
    .bind(game)
    .bind(i64::from(category))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(rank, id, principal_id)| RankingWatermark {
        rank: rank as u32,
        unique_id: id.parse().unwrap_or(0),
        principal_id,
    }))
}

/// Persists one batch of entries in a single transaction (spec.md §3
/// "Persistence-sink writes for a single batch are atomic").
pub async fn persist_batch(
    pool: &SqlitePool,
    game: &str,
    category: u32,
    entries: &[RankingEntry],
) -> Result<(), PersistenceError> {
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(
            "INSERT INTO ranking (game, id, pid, rank, category, score, param, data, \
             update_time) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game)
        .bind(entry.unique_id.to_string())
        .bind(&entry.principal_id)
        .bind(i64::from(entry.rank))
        .bind(i64::from(category))
        .bind(entry.score)
        .bind(entry.param.to_string())
        .bind(entry.common_data.clone())
        .bind(entry.update_time.map(|t| t.timestamp()))
        .execute(&mut *tx)
        .await?;

        for (index, group) in entry.groups.iter().enumerate() {
            sqlx::query(
                "INSERT INTO ranking_group (game, id, category, rank, ranking_index, \
                 ranking_group) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(game)
            .bind(entry.unique_id.to_string())
            .bind(i64::from(category))
            .bind(i64::from(entry.rank))
            .bind(index as i64)
            .bind(i64::from(*group))
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{open_pool, schema::migrate_ranking};

    async fn fixture_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = open_pool(dir.path().join("ranking.db"), Duration::from_secs(5))
            .await
            .expect("open pool");
        migrate_ranking(&pool).await.expect("migrate");
        (dir, pool)
    }

    fn entry(rank: u32, unique_id: u64) -> RankingEntry {
        RankingEntry {
            unique_id,
            principal_id: unique_id.to_string(),
            rank,
            score: 100,
            groups: vec![1, 2, 3],
            param: 0,
            common_data: vec![],
            update_time: None,
        }
    }

    #[tokio::test]
    async fn persists_batch_and_reports_row_count() {
        let (_dir, pool) = fixture_pool().await;

        persist_batch(&pool, "game-a", 7, &[entry(1, 100), entry(2, 101)])
            .await
            .expect("persist batch");

        assert_eq!(row_count(&pool, "game-a", 7).await.expect("count"), 2);
        assert_eq!(row_count(&pool, "game-a", 8).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn highest_watermark_tracks_max_rank() {
        let (_dir, pool) = fixture_pool().await;
        persist_batch(&pool, "game-a", 7, &[entry(1, 100), entry(5, 105), entry(3, 103)])
            .await
            .expect("persist batch");

        let watermark = highest_watermark(&pool, "game-a", 7)
            .await
            .expect("query")
            .expect("watermark present");
        assert_eq!(watermark.rank, 5);
        assert_eq!(watermark.unique_id, 105);
    }

    #[tokio::test]
    async fn highest_watermark_is_none_for_empty_category() {
        let (_dir, pool) = fixture_pool().await;
        let watermark = highest_watermark(&pool, "game-a", 7).await.expect("query");
        assert!(watermark.is_none());
    }
}
