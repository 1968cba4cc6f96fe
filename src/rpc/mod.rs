//! The RPC Session contract (spec.md §2 item 2, §6), the Retry Wrapper
//! (spec.md §4.1), and the wire-independent request/response types both
//! sides exchange. No concrete transport ships here — it's an external
//! collaborator per spec.md §1.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// In-memory [`session::NexSession`] double used by tests throughout this
/// crate and by the `tests/` integration suite.
pub mod mock;
/// The Retry Wrapper.
pub mod retry;
/// `RankingRpc` / `DataStoreRpc` / `NexSession` / `SessionFactory` traits
/// and `RpcError`.
pub mod session;
/// Wire-independent request/response types.
pub mod types;
