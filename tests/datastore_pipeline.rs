// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end exercise of the DataStore pipeline (spec.md §8 scenario 4:
//! a metadata batch with some per-id failures, feeding only the oversized
//! survivors into the Blob Fetcher) driven through
//! [`harvest::coordinator`].

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use nex_harvester::{
    cfg::config::RuntimeConfig,
    harvest::coordinator,
    rpc::{
        mock::MockSession,
        session::{RpcError, SessionFactory},
        types::{DataStoreMeta, PreparedObject, SearchObjectResult},
    },
    store::{self, datastore_sink, schema::migrate_datastore},
};

fn meta(data_id: u64, size: u64) -> DataStoreMeta {
    let now = Utc::now();
    DataStoreMeta {
        data_id,
        owner_id: "100".to_string(),
        size,
        name: "object".to_string(),
        data_type: 1,
        meta_binary: vec![],
        permission: Default::default(),
        delete_permission: Default::default(),
        create_time: now,
        update_time: now,
        referred_time: now,
        expire_time: None,
        period: 0,
        status: 0,
        referred_count: 0,
        refer_data_id: 0,
        flag: 0,
        tags: vec![],
        ratings: vec![],
    }
}

/// Builds a session scripted for every verb any of the three connections
/// (capability probe/range finder, the lone scanner worker, the lone
/// fetcher worker) might call. Each `connect()` returns an independent copy
/// of the same script, so the test doesn't depend on the order in which
/// the coordinator's concurrently-spawned worker tasks happen to dial in
/// (spec.md §5: workers never share mutable RPC sessions, and nothing
/// orders their connection attempts relative to each other).
fn build_session() -> MockSession {
    let mut session = MockSession::default();

    // Capability probe + range finder (spec.md §4.4, §4.5).
    session.push_search_object(Ok(None)); // capability probe: success => supported
    session.push_search_object(Ok(Some(SearchObjectResult {
        data_id: 10,
        create_time: Utc::now(),
    }))); // range finder step 1: ascending search finds `first`
    session.push_search_object(Ok(Some(SearchObjectResult {
        data_id: 12,
        create_time: Utc::now(),
    }))); // range finder step 3: first walk-back hit gives `late`

    // Metadata scanner (spec.md §4.6): one batch covering ids 10..12
    // (batch_size=3 covers the whole range in one call), then an empty
    // window past `late` to terminate.
    session.push_get_metas(Ok(vec![
        (10, Ok(meta(10, 512))),
        (
            11,
            Err(RpcError::Application {
                name: "DataStore::NotFound".to_string(),
                message: "gone".to_string(),
            }),
        ),
        (12, Ok(meta(12, 0))),
    ]));
    session.push_get_metas(Ok(vec![]));

    // Blob fetcher (spec.md §4.7): only data_id 10 is ever queued (size > 0;
    // data_id 12 has size == 0 and never reaches the queue), so exactly one
    // `prepare_get_object` call happens across the whole run.
    session.push_prepare_get_object(Ok(PreparedObject {
        url: "https://example.test/object/10".to_string(),
        headers: vec![],
    }));

    session
}

struct IdenticalSessionFactory;

impl SessionFactory for IdenticalSessionFactory {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, RpcError> {
        Ok(build_session())
    }
}

#[tokio::test]
async fn datastore_pipeline_skips_failed_ids_and_fetches_only_oversized_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = store::open_pool(dir.path().join("datastore.db"), Duration::from_secs(5))
        .await
        .expect("open pool");
    migrate_datastore(&pool).await.expect("migrate");

    let factory = Arc::new(IdenticalSessionFactory);

    let runtime = RuntimeConfig {
        retry_max_backoff: Duration::from_millis(1),
        metadata_scanner_workers: 1,
        blob_fetcher_workers: 1,
        metadata_batch_size: 3,
        range_finder_floor: 900_000_000, // never clamps; keep discovered `first`
        blob_http_timeout: Duration::from_secs(2),
        ..RuntimeConfig::default()
    };

    let http_client = reqwest::Client::new();

    coordinator::run_datastore_title(pool.clone(), "game-a".to_string(), factory, &runtime, false, false, http_client)
        .await
        .expect("datastore pipeline completes");

    let max = datastore_sink::max_data_id(&pool, "game-a").await.expect("query max");
    assert_eq!(max, Some(12));

    let unfetched = datastore_sink::unfetched_data_ids(&pool, "game-a").await.expect("query unfetched");
    assert!(unfetched.is_empty(), "data_id 10 (the only size>0 entry) should have been fetched");
}
