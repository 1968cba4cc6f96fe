//! DataStore Capability Probe (spec.md §4.4): a single call that classifies
//! whether a title's server supports the search-based discovery verbs this
//! crate's Range Finder depends on.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use crate::rpc::{
    retry::with_retry,
    session::{RpcError, SessionFactory},
    types::SearchObjectParams,
};

/// Issues `search_object(offset=0, count=1)` and classifies the result
/// (spec.md §8 "Capability probe classification"): `NotImplemented` is
/// false, `NotFound` or success is true, any other application error is
/// treated conservatively as false (search-unsupported).
pub async fn search_supported<F: SessionFactory>(
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
) -> bool {
    let params = SearchObjectParams {
        count: 1,
        order_ascending: None,
        created_after: None,
    };

    let outcome = with_retry(session, factory, max_backoff, |s| {
        let params = params.clone();
        async move { s.search_object(params).await }
    })
    .await;

    match outcome {
        Ok(_) => true,
        Err(RpcError::Application { name, .. }) => name != "Core::NotImplemented",
        Err(RpcError::Transport(_)) => unreachable!("with_retry retries transport errors"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockSession;

    struct SingleSessionFactory;

    impl SessionFactory for SingleSessionFactory {
        type Session = MockSession;

        async fn connect(&self) -> Result<MockSession, RpcError> {
            Ok(MockSession::default())
        }
    }

    #[tokio::test]
    async fn not_implemented_is_unsupported() {
        let mut session = MockSession::default();
        session.push_search_object(Err(RpcError::Application {
            name: "Core::NotImplemented".to_string(),
            message: "no search support".to_string(),
        }));
        let factory = SingleSessionFactory;
        assert!(!search_supported::<SingleSessionFactory>(&mut session, &factory, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn not_found_is_supported() {
        let mut session = MockSession::default();
        session.push_search_object(Err(RpcError::Application {
            name: "DataStore::NotFound".to_string(),
            message: "empty store".to_string(),
        }));
        let factory = SingleSessionFactory;
        assert!(search_supported::<SingleSessionFactory>(&mut session, &factory, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn success_is_supported() {
        let mut session = MockSession::default();
        session.push_search_object(Ok(None));
        let factory = SingleSessionFactory;
        assert!(search_supported::<SingleSessionFactory>(&mut session, &factory, Duration::from_millis(1)).await);
    }
}
