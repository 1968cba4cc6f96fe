// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An in-memory [`NexSession`](crate::rpc::session::NexSession)
//! implementation backing both `RankingRpc` and `DataStoreRpc` so the
//! harvest pipelines are testable without a live game server (spec.md §6,
//! SPEC_FULL.md §6). Scripted by pushing canned responses that are popped
//! in FIFO order as calls come in; calling past the end of a script is a
//! test-authoring bug and panics rather than silently stalling the test.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::rpc::{
    session::{DataStoreRpc, RankingRpc, RpcError},
    types::{
        DataStoreMeta, GetRankingRequest, GetRankingResponse, PersistenceTarget, PreparedObject,
        SearchObjectParams, SearchObjectResult,
    },
};

#[derive(Default)]
pub struct MockSession {
    ranking: Mutex<VecDeque<Result<GetRankingResponse, RpcError>>>,
    search_object: Mutex<VecDeque<Result<Option<SearchObjectResult>, RpcError>>>,
    get_metas: Mutex<VecDeque<Result<Vec<(u64, Result<DataStoreMeta, RpcError>)>, RpcError>>>,
    get_metas_multiple_param:
        Mutex<VecDeque<Result<Vec<(PersistenceTarget, Result<DataStoreMeta, RpcError>)>, RpcError>>>,
    prepare_get_object: Mutex<VecDeque<Result<PreparedObject, RpcError>>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ranking(&mut self, response: Result<GetRankingResponse, RpcError>) -> &mut Self {
        self.ranking.get_mut().push_back(response);
        self
    }

    pub fn push_search_object(
        &mut self,
        response: Result<Option<SearchObjectResult>, RpcError>,
    ) -> &mut Self {
        self.search_object.get_mut().push_back(response);
        self
    }

    pub fn push_get_metas(
        &mut self,
        response: Result<Vec<(u64, Result<DataStoreMeta, RpcError>)>, RpcError>,
    ) -> &mut Self {
        self.get_metas.get_mut().push_back(response);
        self
    }

    pub fn push_get_metas_multiple_param(
        &mut self,
        response: Result<Vec<(PersistenceTarget, Result<DataStoreMeta, RpcError>)>, RpcError>,
    ) -> &mut Self {
        self.get_metas_multiple_param.get_mut().push_back(response);
        self
    }

    pub fn push_prepare_get_object(
        &mut self,
        response: Result<PreparedObject, RpcError>,
    ) -> &mut Self {
        self.prepare_get_object.get_mut().push_back(response);
        self
    }
}

impl RankingRpc for MockSession {
    async fn get_ranking(
        &self,
        _request: GetRankingRequest,
    ) -> Result<GetRankingResponse, RpcError> {
        self.ranking
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("MockSession: get_ranking script exhausted"))
    }
}

impl DataStoreRpc for MockSession {
    async fn search_object(
        &self,
        _params: SearchObjectParams,
    ) -> Result<Option<SearchObjectResult>, RpcError> {
        self.search_object
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("MockSession: search_object script exhausted"))
    }

    async fn get_metas(
        &self,
        _ids: &[u64],
    ) -> Result<Vec<(u64, Result<DataStoreMeta, RpcError>)>, RpcError> {
        self.get_metas
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("MockSession: get_metas script exhausted"))
    }

    async fn get_metas_multiple_param(
        &self,
        _targets: &[PersistenceTarget],
    ) -> Result<Vec<(PersistenceTarget, Result<DataStoreMeta, RpcError>)>, RpcError> {
        self.get_metas_multiple_param
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("MockSession: get_metas_multiple_param script exhausted"))
    }

    async fn prepare_get_object(&self, _data_id: u64) -> Result<PreparedObject, RpcError> {
        self.prepare_get_object
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| panic!("MockSession: prepare_get_object script exhausted"))
    }
}
