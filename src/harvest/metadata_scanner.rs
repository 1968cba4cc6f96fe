//! Metadata Scanner (spec.md §4.6): a pool of workers that sweep the
//! `data_id` range in fixed-size batches, persisting metadata and feeding
//! the Blob Fetcher's queue.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::Sender;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    harvest::range_finder::DataRange,
    rpc::{
        retry::with_retry,
        session::{RpcError, SessionFactory},
    },
    store::datastore_sink,
};

/// A `(data_id, owner_id)` pair queued for the Blob Fetcher.
pub type BlobTask = (u64, String);

/// Runs one of `worker_count` scanner workers over `range`, partitioned
/// round-robin: worker `index` starts at `range.first + index * batch_size`
/// and advances by `worker_count * batch_size` each step (spec.md §4.6,
/// §8 "DataStore scanner partitioning").
///
/// Stops once the current window has fully passed `range.late` *and* the
/// most recent call returned zero successes — the "have_seen_late + empty"
/// rule that tolerates sparse stretches inside the live range.
pub async fn run_worker<F: SessionFactory>(
    pool: &SqlitePool,
    game: &str,
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    index: u32,
    worker_count: u32,
    batch_size: u64,
    range: DataRange,
    blob_tx: Sender<BlobTask>,
) -> Result<()> {
    let mut cursor = range.first + u64::from(index) * batch_size;
    let stride = u64::from(worker_count) * batch_size;

    loop {
        let ids: Vec<u64> = (cursor..cursor.saturating_add(batch_size)).collect();

        let outcome = with_retry(session, factory, max_backoff, |s| {
            let ids = ids.clone();
            async move { s.get_metas(&ids).await }
        })
        .await;

        let successes = match outcome {
            Ok(per_id) => per_id.into_iter().filter_map(|(id, res)| res.ok().map(|meta| (id, meta))).collect(),
            Err(RpcError::Application { .. }) => Vec::new(),
            Err(RpcError::Transport(_)) => unreachable!("with_retry retries transport errors"),
        };

        if !successes.is_empty() {
            let metas: Vec<_> = successes.iter().map(|(_, meta)| meta.clone()).collect();
            datastore_sink::persist_meta_batch(pool, game, &metas)
                .await
                .context("persisting metadata batch")?;

            for (data_id, meta) in &successes {
                if meta.size > 0 {
                    blob_tx
                        .send((*data_id, meta.owner_id.clone()))
                        .await
                        .context("blob queue closed")?;
                }
            }
        }

        let passed_late = cursor > range.late;
        if passed_late && successes.is_empty() {
            info!(game, worker = index, cursor, "metadata scanner worker done");
            return Ok(());
        }

        cursor = cursor.saturating_add(stride);
    }
}
