// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::rpc::types::{
    DataStoreMeta, GetRankingRequest, GetRankingResponse, PersistenceTarget, PreparedObject,
    SearchObjectParams, SearchObjectResult,
};

/// The two error kinds the Retry Wrapper must tell apart (spec.md §1 item
/// 3, §7 kinds 1 and 2). `Transport` covers "connection closed",
/// "handshake failed", and socket timeouts; `Application` covers named RPC
/// errors such as `Core::NotImplemented`, `DataStore::NotFound`, or
/// `Ranking::NotFound`.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{name}: {message}")]
    Application { name: String, message: String },
}

impl RpcError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }

    /// Matches a named application error, e.g.
    /// `err.is_application("Core::NotImplemented")`.
    pub fn is_application(&self, name: &str) -> bool {
        matches!(self, RpcError::Application { name: n, .. } if n == name)
    }
}

/// The Ranking verbs named in spec.md §2 item 2. No concrete wire
/// transport ships in this crate (spec.md §1); implementors own the
/// handshake, framing, and crypto.
pub trait RankingRpc: Send + Sync {
    fn get_ranking(
        &self,
        request: GetRankingRequest,
    ) -> impl Future<Output = Result<GetRankingResponse, RpcError>> + Send;
}

/// The DataStore verbs named in spec.md §2 item 2.
pub trait DataStoreRpc: Send + Sync {
    fn search_object(
        &self,
        params: SearchObjectParams,
    ) -> impl Future<Output = Result<Option<SearchObjectResult>, RpcError>> + Send;

    /// Looks up metadata for a batch of ids. The outer `Result` is the
    /// whole-call outcome (e.g. transport failure); the inner one is the
    /// per-id outcome within a successful call — some ids legitimately
    /// fail (deleted, never existed) without the whole batch failing
    /// (spec.md §4.6, end-to-end scenario 4).
    fn get_metas(
        &self,
        ids: &[u64],
    ) -> impl Future<Output = Result<Vec<(u64, Result<DataStoreMeta, RpcError>)>, RpcError>> + Send;

    /// Persistence-indexed lookup used by the Metadata-By-Persistence
    /// Scanner (spec.md §4.8).
    fn get_metas_multiple_param(
        &self,
        targets: &[PersistenceTarget],
    ) -> impl Future<
        Output = Result<Vec<(PersistenceTarget, Result<DataStoreMeta, RpcError>)>, RpcError>,
    > + Send;

    fn prepare_get_object(
        &self,
        data_id: u64,
    ) -> impl Future<Output = Result<PreparedObject, RpcError>> + Send;
}

/// One authenticated game-server channel exposing both service's verbs
/// (spec.md §2 item 2). Blanket-implemented for anything implementing
/// both traits.
pub trait NexSession: RankingRpc + DataStoreRpc {}

impl<T: RankingRpc + DataStoreRpc> NexSession for T {}

/// Rebuilds a [`NexSession`] from the stored session descriptor after a
/// transport failure (spec.md §4.1: "opens a new one using the stored
/// {host, port, principal, password, auth-info}"). Implementors own the
/// login handshake.
pub trait SessionFactory: Send + Sync {
    type Session: NexSession + Send + Sync;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, RpcError>> + Send;
}
