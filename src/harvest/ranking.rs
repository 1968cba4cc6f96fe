//! Ranking Harvester (spec.md §4.3): per-(title, category) state machine
//! that enumerates a leaderboard to completion, combining offset-paged
//! scans with around-self cursor scans to work around the server's
//! offset cap.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    rpc::{
        retry::with_retry,
        session::{RpcError, SessionFactory},
        types::{GetRankingRequest, RankingEntry, RankingTarget},
    },
    store::ranking_sink::{self, RankingWatermark},
};

#[derive(Debug)]
enum State {
    ProbeTotal,
    ResumeCheck,
    OffsetScan { cursor: u32 },
    AroundSelfBootstrap,
    AroundSelfScan,
    Done,
}

struct Ctx {
    total: u64,
    watermark: Option<RankingWatermark>,
}

/// Drops entries at or below the watermark, preserving the monotonicity
/// invariant (spec.md §3, §8 "Ranking duplicate-filter correctness").
fn filter_above_watermark(entries: Vec<RankingEntry>, watermark_rank: Option<u32>) -> Vec<RankingEntry> {
    match watermark_rank {
        Some(rank) => entries.into_iter().filter(|e| e.rank > rank).collect(),
        None => entries,
    }
}

/// Decides where S2 goes once the offset cap is hit (an empty page or an
/// application error, rather than the page simply running dry because
/// `total` was reached): `Done` if `total` turns out to have been reached
/// anyway, `AroundSelfBootstrap` otherwise (spec.md §4.3 S2/S3).
fn next_after_offset_cap(cursor: u32, total: u64) -> State {
    if u64::from(cursor) >= total {
        State::Done
    } else {
        State::AroundSelfBootstrap
    }
}

fn watermark_from_last(entries: &[RankingEntry], fallback: Option<RankingWatermark>) -> Option<RankingWatermark> {
    entries
        .last()
        .map(|e| RankingWatermark {
            rank: e.rank,
            unique_id: e.unique_id,
            principal_id: e.principal_id.clone(),
        })
        .or(fallback)
}

/// Drives one (title, category) leaderboard to completion, persisting every
/// newly-observed row through [`ranking_sink`].
pub async fn harvest_category<F: SessionFactory>(
    pool: &SqlitePool,
    game: &str,
    category: u32,
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
) -> Result<()> {
    let mut state = State::ProbeTotal;
    let mut ctx = Ctx {
        total: 0,
        watermark: None,
    };

    loop {
        state = match state {
            State::ProbeTotal => {
                let probe = with_retry(session, factory, max_backoff, |s| async move {
                    s.get_ranking(GetRankingRequest::probe(category)).await
                })
                .await;

                match probe {
                    Ok(response) => {
                        ctx.total = response.total;
                        ctx.watermark = response.entries.first().map(|e| RankingWatermark {
                            rank: e.rank,
                            unique_id: e.unique_id,
                            principal_id: e.principal_id.clone(),
                        });
                        State::ResumeCheck
                    },
                    Err(err) => {
                        warn!(game, category, %err, "ranking probe failed, abandoning category");
                        State::Done
                    },
                }
            },

            State::ResumeCheck => {
                let count = ranking_sink::row_count(pool, game, category)
                    .await
                    .context("querying ranking row count")?;

                if count as u64 >= ctx.total {
                    State::Done
                } else if count == 0 {
                    State::OffsetScan { cursor: 0 }
                } else {
                    ctx.watermark = ranking_sink::highest_watermark(pool, game, category)
                        .await
                        .context("querying ranking watermark")?;
                    State::AroundSelfScan
                }
            },

            State::OffsetScan { cursor } => {
                let page = with_retry(session, factory, max_backoff, |s| async move {
                    s.get_ranking(GetRankingRequest::offset_page(category, cursor)).await
                })
                .await;

                match page {
                    // S2 persists every returned entry unfiltered (spec.md §4.3
                    // S2: "persist all returned entries"); duplicate filtering
                    // only ever happens at the S4 around-self boundary. An
                    // empty page or application error means the offset cap
                    // has been hit, short of `total`, and S3/S4 must finish
                    // the job — unless `total` was already reached, in which
                    // case the category is simply done.
                    Ok(response) if response.entries.is_empty() => {
                        next_after_offset_cap(cursor, ctx.total)
                    },
                    Ok(response) => {
                        let advance = response.entries.len() as u32;
                        ranking_sink::persist_batch(pool, game, category, &response.entries)
                            .await
                            .context("persisting offset-scan batch")?;
                        ctx.watermark = watermark_from_last(&response.entries, ctx.watermark.take());

                        let cursor = cursor + advance;
                        if u64::from(cursor) >= ctx.total {
                            State::Done
                        } else {
                            State::OffsetScan { cursor }
                        }
                    },
                    Err(RpcError::Application { .. }) => next_after_offset_cap(cursor, ctx.total),
                    Err(RpcError::Transport(_)) => unreachable!("with_retry retries transport errors"),
                }
            },

            State::AroundSelfBootstrap => {
                if ctx.watermark.is_some() {
                    State::AroundSelfScan
                } else {
                    State::Done
                }
            },

            State::AroundSelfScan => {
                let watermark = ctx
                    .watermark
                    .as_ref()
                    .expect("AroundSelfScan only entered with a watermark")
                    .clone();
                let target = RankingTarget {
                    unique_id: watermark.unique_id,
                    principal_id: watermark.principal_id.clone(),
                };

                let page = with_retry(session, factory, max_backoff, |s| {
                    let target = target.clone();
                    async move { s.get_ranking(GetRankingRequest::around_self(category, target)).await }
                })
                .await;

                match page {
                    Ok(response) => {
                        let filtered = filter_above_watermark(response.entries, Some(watermark.rank));
                        if filtered.is_empty() {
                            State::Done
                        } else {
                            ranking_sink::persist_batch(pool, game, category, &filtered)
                                .await
                                .context("persisting around-self batch")?;
                            ctx.watermark = watermark_from_last(&filtered, ctx.watermark.take());
                            State::AroundSelfScan
                        }
                    },
                    Err(_) => State::Done,
                }
            },

            State::Done => {
                info!(game, category, total = ctx.total, "ranking category complete");
                return Ok(());
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        rpc::{mock::MockSession, types::GetRankingResponse},
        store::{open_pool, schema::migrate_ranking},
    };

    struct SingleSessionFactory;

    impl SessionFactory for SingleSessionFactory {
        type Session = MockSession;

        async fn connect(&self) -> Result<MockSession, RpcError> {
            Ok(MockSession::default())
        }
    }

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
            groups: vec![],
            param: 0,
            common_data: vec![],
            update_time: None,
        }
    }

    /// End-to-end scenario 1 (spec.md §8): total=3, one page returns all
    /// three ranks; S2 reaches `cursor >= total` immediately and the
    /// machine never needs S4 (no third call is scripted, so a spurious
    /// around-self call would panic the mock).
    #[tokio::test]
    async fn single_page_completes_without_around_self() {
        let (_dir, pool) = fixture_pool().await;
        let mut session = MockSession::default();

        session.push_ranking(Ok(GetRankingResponse {
            total: 3,
            entries: vec![entry(1, 100)],
        }));
        session.push_ranking(Ok(GetRankingResponse {
            total: 3,
            entries: vec![entry(1, 100), entry(2, 101), entry(3, 102)],
        }));

        let factory = SingleSessionFactory;
        harvest_category::<SingleSessionFactory>(&pool, "game-a", 1, &mut session, &factory, Duration::from_millis(1))
            .await
            .expect("harvest category");

        assert_eq!(ranking_sink::row_count(&pool, "game-a", 1).await.expect("count"), 3);
    }

    /// Ranking idempotent resume (spec.md §8): row-count already equals
    /// total, so S1 transitions straight to DONE and nothing new is
    /// written.
    #[tokio::test]
    async fn resume_with_full_count_writes_nothing() {
        let (_dir, pool) = fixture_pool().await;
        ranking_sink::persist_batch(&pool, "game-a", 1, &[entry(1, 100)])
            .await
            .expect("seed existing row");

        let mut session = MockSession::default();
        session.push_ranking(Ok(GetRankingResponse {
            total: 1,
            entries: vec![entry(1, 100)],
        }));

        let factory = SingleSessionFactory;
        harvest_category::<SingleSessionFactory>(&pool, "game-a", 1, &mut session, &factory, Duration::from_millis(1))
            .await
            .expect("harvest category");

        assert_eq!(ranking_sink::row_count(&pool, "game-a", 1).await.expect("count"), 1);
    }

    /// Ranking duplicate-filter correctness (spec.md §8): S2 persists ranks
    /// 1..3 unfiltered (`cursor (3) < total (5)` keeps S2 going), the next
    /// offset page comes back empty (the server's offset cap), sending the
    /// machine into S4. The first around-self call repeats the stale ranks
    /// 1..3 alongside the two genuinely new ranks 4 and 5; filtering drops
    /// only the stale ones, leaving 5 rows persisted in total (3 from S2,
    /// 2 from S4).
    #[tokio::test]
    async fn around_self_filters_entries_at_or_below_watermark() {
        let (_dir, pool) = fixture_pool().await;
        let mut session = MockSession::default();

        // S0: total is larger than the single page S2 can supply.
        session.push_ranking(Ok(GetRankingResponse {
            total: 5,
            entries: vec![entry(1, 100)],
        }));
        // S2: first offset page returns ranks 1..3; the second comes back
        // empty (the offset cap), short of `total`, forcing S3/S4.
        session.push_ranking(Ok(GetRankingResponse {
            total: 5,
            entries: vec![entry(1, 100), entry(2, 101), entry(3, 102)],
        }));
        session.push_ranking(Ok(GetRankingResponse {
            total: 5,
            entries: vec![],
        }));
        // S4: first around-self call repeats ranks 1..3 (stale cursor) plus
        // the two genuinely new ranks 4 and 5.
        session.push_ranking(Ok(GetRankingResponse {
            total: 5,
            entries: vec![entry(1, 100), entry(2, 101), entry(3, 102), entry(4, 103), entry(5, 104)],
        }));
        session.push_ranking(Ok(GetRankingResponse {
            total: 5,
            entries: vec![],
        }));

        let factory = SingleSessionFactory;
        harvest_category::<SingleSessionFactory>(&pool, "game-a", 1, &mut session, &factory, Duration::from_millis(1))
            .await
            .expect("harvest category");

        assert_eq!(ranking_sink::row_count(&pool, "game-a", 1).await.expect("count"), 5);
    }
}
