//! Harvest Coordinator (spec.md §4.10): per-title orchestrator. Builds
//! sessions, runs the prober/range-finder, pre-fills the blob queue from a
//! prior run's resume point, spawns the worker pools, and joins on them.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::{
    cfg::config::RuntimeConfig,
    harvest::{blob_fetcher, category_prober, datastore_probe, metadata_scanner, persistence_scanner, ranking, range_finder},
    rpc::session::SessionFactory,
    store::datastore_sink,
};

/// Runs the Ranking Harvester pipeline for one title: Category Prober, then
/// up to `runtime.ranking_subgroup_size` category state machines advanced
/// in parallel (spec.md §4.3 "32 categories per title ... in parallel").
pub async fn run_ranking_title<F>(
    pool: SqlitePool,
    game: String,
    factory: Arc<F>,
    runtime: &RuntimeConfig,
    special_categories: &[u32],
) -> Result<()>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    let mut probe_session = factory.connect().await.context("connecting for category probe")?;
    let categories = category_prober::probe_categories::<F>(
        &mut probe_session,
        factory.as_ref(),
        runtime.retry_max_backoff,
        special_categories,
    )
    .await;
    info!(game, categories = categories.len(), "category prober complete");

    let semaphore = Arc::new(Semaphore::new(runtime.ranking_subgroup_size));
    let mut handles = Vec::with_capacity(categories.len());

    for category in categories {
        let semaphore = semaphore.clone();
        let pool = pool.clone();
        let game = game.clone();
        let factory = factory.clone();
        let max_backoff = runtime.retry_max_backoff;

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("ranking subgroup semaphore is never closed");
            let mut session = factory.connect().await?;
            ranking::harvest_category::<F>(&pool, &game, category, &mut session, factory.as_ref(), max_backoff).await
        }));
    }

    join_all(handles, "ranking category").await;
    Ok(())
}

/// Runs the DataStore pipeline for one title: Capability Probe, Range
/// Finder, Metadata Scanner pool, and (unless `just_metas`) the Blob
/// Fetcher pool, joined at the end (spec.md §4.10).
pub async fn run_datastore_title<F>(
    pool: SqlitePool,
    game: String,
    factory: Arc<F>,
    runtime: &RuntimeConfig,
    sampling: bool,
    just_metas: bool,
    http_client: reqwest::Client,
) -> Result<()>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    let mut probe_session = factory.connect().await.context("connecting for capability probe")?;

    if !datastore_probe::search_supported::<F>(&mut probe_session, factory.as_ref(), runtime.retry_max_backoff).await {
        info!(game, "search_object unsupported, skipping datastore harvest");
        return Ok(());
    }

    let range = range_finder::find_range::<F>(
        &mut probe_session,
        factory.as_ref(),
        runtime.retry_max_backoff,
        runtime.range_finder_floor,
        sampling,
        runtime.sampling_span,
    )
    .await;

    let Some(range) = range else {
        warn!(game, "range finder found no live data_id interval");
        return Ok(());
    };

    let prior_max = datastore_sink::max_data_id(&pool, &game).await.context("querying prior max data_id")?;
    let range = range_finder::apply_resume_floor(range, prior_max);
    info!(game, first = range.first, late = range.late, "range finder complete");

    let (blob_tx, blob_rx) = async_channel::bounded(runtime.blob_queue_capacity);

    for data_id in datastore_sink::unfetched_data_ids(&pool, &game).await.context("listing unfetched data ids")? {
        blob_tx.send((data_id, String::new())).await.context("pre-filling blob queue")?;
    }

    let done = Arc::new(AtomicBool::new(false));
    let mut scanner_handles = Vec::with_capacity(runtime.metadata_scanner_workers);

    for index in 0..runtime.metadata_scanner_workers as u32 {
        let pool = pool.clone();
        let game = game.clone();
        let factory = factory.clone();
        let max_backoff = runtime.retry_max_backoff;
        let batch_size = runtime.metadata_batch_size;
        let worker_count = runtime.metadata_scanner_workers as u32;
        let blob_tx = blob_tx.clone();

        scanner_handles.push(tokio::spawn(async move {
            let mut session = factory.connect().await?;
            metadata_scanner::run_worker::<F>(
                &pool,
                &game,
                &mut session,
                factory.as_ref(),
                max_backoff,
                index,
                worker_count,
                batch_size,
                range,
                blob_tx,
            )
            .await
        }));
    }
    // Drop the coordinator's own sender so the channel closes once every
    // scanner worker's clone is dropped.
    drop(blob_tx);

    let mut fetcher_handles = Vec::with_capacity(runtime.blob_fetcher_workers);
    if !just_metas {
        for _ in 0..runtime.blob_fetcher_workers {
            let pool = pool.clone();
            let game = game.clone();
            let factory = factory.clone();
            let max_backoff = runtime.retry_max_backoff;
            let http_client = http_client.clone();
            let http_timeout = runtime.blob_http_timeout;
            let blob_rx = blob_rx.clone();
            let done = done.clone();

            fetcher_handles.push(tokio::spawn(async move {
                let mut session = factory.connect().await?;
                blob_fetcher::run_worker::<F>(
                    &pool,
                    &game,
                    &mut session,
                    factory.as_ref(),
                    max_backoff,
                    &http_client,
                    http_timeout,
                    blob_rx,
                    done,
                )
                .await
            }));
        }
    }

    join_all(scanner_handles, "metadata scanner").await;
    done.store(true, Ordering::SeqCst);
    join_all(fetcher_handles, "blob fetcher").await;

    Ok(())
}

/// Runs the Metadata-By-Persistence Scanner for one title, queuing blob
/// fetches for any oversized recovered entries (spec.md §4.8).
pub async fn run_persistence_title<F>(
    pool: SqlitePool,
    game: String,
    factory: Arc<F>,
    runtime: &RuntimeConfig,
    http_client: reqwest::Client,
) -> Result<()>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    let mut session = factory.connect().await.context("connecting for persistence scan")?;
    let (blob_tx, blob_rx) = async_channel::bounded(runtime.blob_queue_capacity);

    persistence_scanner::run::<F>(&pool, &game, &mut session, factory.as_ref(), runtime.retry_max_backoff, blob_tx)
        .await?;

    let done = Arc::new(AtomicBool::new(true));
    let mut fetcher_handles = Vec::with_capacity(runtime.blob_fetcher_workers);
    for _ in 0..runtime.blob_fetcher_workers {
        let pool = pool.clone();
        let game = game.clone();
        let factory = factory.clone();
        let max_backoff = runtime.retry_max_backoff;
        let http_client = http_client.clone();
        let http_timeout = runtime.blob_http_timeout;
        let blob_rx = blob_rx.clone();
        let done = done.clone();

        fetcher_handles.push(tokio::spawn(async move {
            let mut session = factory.connect().await?;
            blob_fetcher::run_worker::<F>(
                &pool,
                &game,
                &mut session,
                factory.as_ref(),
                max_backoff,
                &http_client,
                http_timeout,
                blob_rx,
                done,
            )
            .await
        }));
    }

    join_all(fetcher_handles, "persistence-scanner blob fetcher").await;
    Ok(())
}

/// Joins a set of worker `JoinHandle`s, logging (not propagating) both
/// application-level failures and panics (spec.md §7 kind 4: "log the full
/// traceback and terminate that worker; the overall harvest continues").
async fn join_all(handles: Vec<tokio::task::JoinHandle<Result<()>>>, role: &str) {
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => warn!(role, %err, "worker returned an error"),
            Err(join_err) => error!(role, %join_err, "worker task panicked"),
        }
    }
}
