//! Category Prober (spec.md §4.2): finds the non-empty category set for a
//! title by sweeping small integers and merging in any sidecar-supplied
//! hard-coded ids.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use crate::rpc::{
    retry::with_retry,
    session::{RpcError, SessionFactory},
    types::GetRankingRequest,
};

/// Upper bound (exclusive) of the fixed small-integer sweep (spec.md §4.2:
/// "0 through 999").
const SWEEP_LIMIT: u32 = 1000;

/// Probes categories `0..1000` plus `special`, returning the sorted,
/// deduplicated set of categories that answered without an application
/// error. Transport errors are retried forever by [`with_retry`]; an
/// application error (e.g. `Ranking::NotFound`) simply excludes that
/// category.
pub async fn probe_categories<F: SessionFactory>(
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    special: &[u32],
) -> Vec<u32> {
    let mut found = Vec::new();

    for category in 0..SWEEP_LIMIT {
        let outcome = with_retry(session, factory, max_backoff, |s| async move {
            s.get_ranking(GetRankingRequest::probe(category)).await
        })
        .await;

        match outcome {
            Ok(_) => found.push(category),
            Err(RpcError::Application { .. }) => {},
            // with_retry only ever returns Ok or an Application error; a
            // Transport error would have been retried internally.
            Err(RpcError::Transport(_)) => {},
        }
    }

    found.extend(special.iter().copied());
    found.sort_unstable();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::rpc::{
        mock::MockSession,
        types::{GetRankingResponse, RankingEntry},
    };

    struct SingleSessionFactory;

    impl SessionFactory for SingleSessionFactory {
        type Session = MockSession;

        async fn connect(&self) -> Result<MockSession, RpcError> {
            Ok(MockSession::default())
        }
    }

    fn ok_response() -> Result<GetRankingResponse, RpcError> {
        Ok(GetRankingResponse {
            total: 1,
            entries: vec![RankingEntry {
                unique_id: 1,
                principal_id: "1".to_string(),
                rank: 1,
                score: 10,
                groups: vec![],
                param: 0,
                common_data: vec![],
                update_time: None,
            }],
        })
    }

    fn not_found() -> Result<GetRankingResponse, RpcError> {
        Err(RpcError::Application {
            name: "Ranking::NotFound".to_string(),
            message: "no such category".to_string(),
        })
    }

    #[tokio::test]
    async fn merges_probed_and_special_categories() {
        let mut session = MockSession::default();
        // only category 0 and 2 answer successfully; the rest fail.
        for category in 0..1000u32 {
            let response = if category == 0 || category == 2 {
                ok_response()
            } else {
                not_found()
            };
            session.push_ranking(response);
        }

        let factory = SingleSessionFactory;
        let found =
            probe_categories::<SingleSessionFactory>(&mut session, &factory, Duration::from_millis(1), &[
                99_999,
            ])
            .await;

        assert_eq!(found, vec![0, 2, 99_999]);
    }

    #[tokio::test]
    async fn empty_sweep_still_returns_special_categories() {
        let mut session = MockSession::default();
        for _ in 0..1000u32 {
            session.push_ranking(not_found());
        }
        let factory = SingleSessionFactory;
        let _ = AtomicU32::new(0);
        let found =
            probe_categories::<SingleSessionFactory>(&mut session, &factory, Duration::from_millis(1), &[
                7, 3,
            ])
            .await;
        assert_eq!(found, vec![3, 7]);
    }
}
