//! Metadata-By-Persistence Scanner (spec.md §4.8): recovers objects whose
//! data-ids aren't discoverable by range sweeping, by walking every
//! already-harvested owner-principal's 16 persistence slots.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::Sender;
use sqlx::SqlitePool;

use crate::{
    harvest::metadata_scanner::BlobTask,
    rpc::{
        retry::with_retry,
        session::{RpcError, SessionFactory},
        types::PersistenceTarget,
    },
    store::datastore_sink,
};

/// Number of persistence slots per owner (spec.md glossary "Persistence
/// slot": 0..15).
const SLOT_COUNT: u8 = 16;

/// Scans every slot of every distinct owner already harvested for `game`,
/// persisting a [`crate::store::datastore_sink::persist_mapping`] row and a
/// meta row for each hit, and queuing a blob fetch for oversized entries.
pub async fn run<F: SessionFactory>(
    pool: &SqlitePool,
    game: &str,
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    blob_tx: Sender<BlobTask>,
) -> Result<()> {
    let owners = datastore_sink::distinct_owner_ids(pool, game)
        .await
        .context("listing harvested owners")?;

    for owner in owners {
        let targets: Vec<PersistenceTarget> = (0..SLOT_COUNT)
            .map(|slot| PersistenceTarget {
                owner_id: owner.clone(),
                slot,
            })
            .collect();

        let outcome = with_retry(session, factory, max_backoff, |s| {
            let targets = targets.clone();
            async move { s.get_metas_multiple_param(&targets).await }
        })
        .await;

        // REDESIGN FLAGS point 7: a failed batch is skipped, never a panic.
        let Ok(results) = outcome else {
            continue;
        };

        for (target, result) in results {
            let Ok(meta) = result else {
                continue;
            };

            datastore_sink::persist_mapping(pool, game, &target.owner_id, target.slot, meta.data_id)
                .await
                .context("persisting persistence mapping")?;
            datastore_sink::persist_meta_batch(pool, game, std::slice::from_ref(&meta))
                .await
                .context("persisting persistence-scanner meta")?;

            if meta.size > 0 {
                blob_tx
                    .send((meta.data_id, meta.owner_id.clone()))
                    .await
                    .context("blob queue closed")?;
            }
        }
    }

    Ok(())
}
