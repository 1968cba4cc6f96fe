//! DataStore Range Finder (spec.md §4.5): discovers the `[first, late]`
//! `data_id` interval the Metadata Scanner sweeps.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    rpc::{
        retry::with_retry,
        session::{RpcError, SessionFactory},
        types::SearchObjectParams,
    },
    util,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRange {
    pub first: u64,
    pub late: u64,
}

async fn search_one<F: SessionFactory>(
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    order_ascending: Option<bool>,
    created_after: Option<DateTime<Utc>>,
) -> Option<u64> {
    let params = SearchObjectParams {
        count: 1,
        order_ascending,
        created_after,
    };

    let outcome = with_retry(session, factory, max_backoff, |s| {
        let params = params.clone();
        async move { s.search_object(params).await }
    })
    .await;

    match outcome {
        Ok(Some(result)) => Some(result.data_id),
        Ok(None) | Err(RpcError::Application { .. }) => None,
        Err(RpcError::Transport(_)) => unreachable!("with_retry retries transport errors"),
    }
}

/// Runs steps 1–4 of spec.md §4.5. Step 5 (the idempotent-resume raise of
/// `first` to a prior run's max persisted `data_id`) is applied by the
/// caller via [`apply_resume_floor`], since it needs the persistence sink.
pub async fn find_range<F: SessionFactory>(
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    floor: u64,
    sampling: bool,
    sampling_span: u64,
) -> Option<DataRange> {
    let mut first = search_one::<F>(session, factory, max_backoff, Some(true), None).await;
    if first.is_none() {
        first = search_one::<F>(session, factory, max_backoff, None, Some(util::service_epoch())).await;
    }
    let mut first = first?;
    if first > floor {
        first = floor;
    }

    let now = Utc::now();
    let service_floor = util::service_epoch();
    let mut late = first;
    for t in util::month_walk_back(now, service_floor) {
        if let Some(hit) = search_one::<F>(session, factory, max_backoff, None, Some(t)).await {
            late = hit;
            break;
        }
    }

    if sampling {
        late = late.min(first.saturating_add(sampling_span));
    }

    Some(DataRange { first, late })
}

/// Step 5: idempotent resume raises `first` to a prior run's max persisted
/// `data_id` when that's higher (spec.md §4.5 step 5).
pub fn apply_resume_floor(range: DataRange, prior_max: Option<u64>) -> DataRange {
    match prior_max {
        Some(max) if max > range.first => DataRange {
            first: max,
            ..range
        },
        _ => range,
    }
}
