// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};

/// `order_calc = 1` on the ranking order-param (spec.md §6): ties get
/// distinct ranks (`1,2,3,4`) instead of shared ones (`1,2,2,4`).
pub const ORDER_CALC_ORDINAL: u32 = 1;

/// `result_option = 0xFF` requests every meta field on a ranking call
/// (spec.md §6).
pub const RESULT_OPTION_ALL: u32 = 0xFF;

/// Server-side page-size cap observed across titles (spec.md §4.3).
pub const RANKING_PAGE_CAP: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    Global,
    GlobalAroundSelf,
}

/// Identifies the entry an `around_self` query is centered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingTarget {
    pub unique_id: u64,
    pub principal_id: String,
}

#[derive(Debug, Clone)]
pub struct GetRankingRequest {
    pub mode: RankingMode,
    pub category: u32,
    pub offset: u32,
    pub count: u32,
    pub order_calc: u32,
    pub result_option: u32,
    /// Required when `mode == GlobalAroundSelf`.
    pub target: Option<RankingTarget>,
}

impl GetRankingRequest {
    /// `get_ranking(mode=GLOBAL, category, offset=0, count=1)` (spec.md
    /// §4.2, the Category Prober's probe call).
    pub fn probe(category: u32) -> Self {
        GetRankingRequest {
            mode: RankingMode::Global,
            category,
            offset: 0,
            count: 1,
            order_calc: ORDER_CALC_ORDINAL,
            result_option: RESULT_OPTION_ALL,
            target: None,
        }
    }

    /// S2 Offset scan page (spec.md §4.3 S2).
    pub fn offset_page(category: u32, offset: u32) -> Self {
        GetRankingRequest {
            mode: RankingMode::Global,
            category,
            offset,
            count: RANKING_PAGE_CAP,
            order_calc: ORDER_CALC_ORDINAL,
            result_option: RESULT_OPTION_ALL,
            target: None,
        }
    }

    /// S4 Around-self scan page (spec.md §4.3 S4).
    pub fn around_self(category: u32, target: RankingTarget) -> Self {
        GetRankingRequest {
            mode: RankingMode::GlobalAroundSelf,
            category,
            offset: 0,
            count: RANKING_PAGE_CAP,
            order_calc: ORDER_CALC_ORDINAL,
            result_option: RESULT_OPTION_ALL,
            target: Some(target),
        }
    }
}

/// One leaderboard row (spec.md §3 `RankingEntry`).
#[derive(Debug, Clone)]
pub struct RankingEntry {
    pub unique_id: u64,
    pub principal_id: String,
    pub rank: u32,
    pub score: i64,
    pub groups: Vec<u8>,
    /// Often an opaque DataStore reference (spec.md §3).
    pub param: u64,
    pub common_data: Vec<u8>,
    /// Present at wire-format version >= 1 (spec.md §9 "Wire-format
    /// override"); implementors of [`crate::rpc::session::RankingRpc`] must
    /// populate it when the server's record carries it.
    pub update_time: Option<DateTime<Utc>>,
    // TODO: per-entry DataStore cross-referencing (the source's
    // `if has_datastore and False:` dead branch in `add_rankings`) is
    // intentionally unimplemented; see spec.md §9 Open Questions.
}

#[derive(Debug, Clone)]
pub struct GetRankingResponse {
    /// Server-claimed total size of the leaderboard; may be smaller than
    /// the true size (spec.md §4.3 tie-breaks/edge cases).
    pub total: u64,
    pub entries: Vec<RankingEntry>,
}

/// Parameters for `datastore.search_object` (spec.md §2, §4.5).
#[derive(Debug, Clone, Default)]
pub struct SearchObjectParams {
    pub count: u32,
    /// `Some(true)` sorts ascending by `data_id`, `Some(false)` descending,
    /// `None` leaves the server's default order.
    pub order_ascending: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SearchObjectResult {
    pub data_id: u64,
    pub create_time: DateTime<Utc>,
}

/// A permission mask plus the principal ids it's scoped to (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct Permission {
    pub mask: u32,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Rating {
    pub slot: u8,
    pub total: i64,
    pub count: u32,
    pub initial: i64,
}

/// One DataStore object's metadata (spec.md §3 `DataStoreMeta`).
#[derive(Debug, Clone)]
pub struct DataStoreMeta {
    pub data_id: u64,
    pub owner_id: String,
    pub size: u64,
    pub name: String,
    pub data_type: u16,
    pub meta_binary: Vec<u8>,
    pub permission: Permission,
    pub delete_permission: Permission,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub referred_time: DateTime<Utc>,
    pub expire_time: Option<DateTime<Utc>>,
    pub period: u16,
    pub status: u8,
    pub referred_count: u32,
    pub refer_data_id: u64,
    pub flag: u32,
    pub tags: Vec<String>,
    pub ratings: Vec<Rating>,
}

/// `(owner, slot)` addressing used by `get_metas_multiple_param`'s
/// persistence-target form (spec.md §4.8, glossary "Persistence slot").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistenceTarget {
    pub owner_id: String,
    pub slot: u8,
}

/// Signed-URL + headers returned by `prepare_get_object` (spec.md §2).
#[derive(Debug, Clone)]
pub struct PreparedObject {
    pub url: String,
    pub headers: Vec<(String, String)>,
}
