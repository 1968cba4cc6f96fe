//! Blob Fetcher (spec.md §4.7): drains the blob queue, resolves each
//! data-id to a signed URL, fetches and gzip-compresses the body, and
//! persists the outcome — success or a recorded error row, never a panic.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_channel::{Receiver, TryRecvError};
use flate2::{Compression, write::GzEncoder};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    harvest::metadata_scanner::BlobTask,
    rpc::{
        retry::with_retry,
        session::{RpcError, SessionFactory},
    },
    store::datastore_sink,
};

/// Poll interval used while the queue is momentarily empty but not yet
/// known to be permanently drained (spec.md §4.7: "non-blocking poll with a
/// small sleep to yield").
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn gzip_compress(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).context("gzip-compressing blob body")?;
    encoder.finish().context("finishing gzip stream")
}

/// Runs one Blob Fetcher worker. Terminates once the queue is empty *and*
/// `done` is set (spec.md §4.7, §5 cancellation model).
pub async fn run_worker<F: SessionFactory>(
    pool: &SqlitePool,
    game: &str,
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    http_client: &reqwest::Client,
    http_timeout: Duration,
    blob_rx: Receiver<BlobTask>,
    done: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        let (data_id, _owner_id) = match blob_rx.try_recv() {
            Ok(task) => task,
            Err(TryRecvError::Empty) => {
                if done.load(Ordering::SeqCst) && blob_rx.is_empty() {
                    info!(game, "blob fetcher worker done");
                    return Ok(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            },
            Err(TryRecvError::Closed) => return Ok(()),
        };

        let prepared = with_retry(session, factory, max_backoff, |s| async move {
            s.prepare_get_object(data_id).await
        })
        .await;

        match prepared {
            Ok(prepared) => fetch_and_persist(pool, game, data_id, &prepared, http_client, http_timeout).await?,
            Err(RpcError::Application { name, message }) => {
                warn!(game, data_id, %name, %message, "prepare_get_object failed");
                datastore_sink::persist_blob(pool, game, data_id, None, None, Some(&format!("{name}: {message}")))
                    .await
                    .context("persisting blob error row")?;
            },
            Err(RpcError::Transport(_)) => unreachable!("with_retry retries transport errors"),
        }
    }
}

async fn fetch_and_persist(
    pool: &SqlitePool,
    game: &str,
    data_id: u64,
    prepared: &crate::rpc::types::PreparedObject,
    http_client: &reqwest::Client,
    http_timeout: Duration,
) -> Result<()> {
    let mut request = http_client.get(&prepared.url).timeout(http_timeout);
    for (name, value) in &prepared.headers {
        request = request.header(name, value);
    }

    let outcome = request.send().await;
    match outcome {
        Ok(response) if response.status().is_success() => match response.bytes().await {
            Ok(body) => {
                let gzipped = gzip_compress(&body)?;
                datastore_sink::persist_blob(pool, game, data_id, Some(&prepared.url), Some(&gzipped), None)
                    .await
                    .context("persisting fetched blob")
            },
            Err(err) => {
                datastore_sink::persist_blob(pool, game, data_id, Some(&prepared.url), None, Some(&err.to_string()))
                    .await
                    .context("persisting blob body-read error")
            },
        },
        Ok(response) => {
            let error = format!("http status {}", response.status());
            datastore_sink::persist_blob(pool, game, data_id, Some(&prepared.url), None, Some(&error))
                .await
                .context("persisting blob status error")
        },
        Err(err) => {
            datastore_sink::persist_blob(pool, game, data_id, Some(&prepared.url), None, Some(&err.to_string()))
                .await
                .context("persisting blob request error")
        },
    }
}
