// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::rpc::session::{RpcError, SessionFactory};

/// Wraps an RPC-using closure over a session. On a transport-class failure
/// it tears down the session and re-establishes one via `factory`, then
/// re-invokes the closure — without bound, per spec.md §4.1 ("the upstream
/// service is known to flap ... MUST NOT abort on transport errors").
/// Application-class failures are returned unchanged on the first
/// occurrence.
///
/// Unlike the source this wraps, this is a non-recursive loop with
/// exponential backoff and full jitter (spec.md §9 "Unbounded recursive
/// retry", REDESIGN FLAGS point 2) rather than unbounded recursion.
pub async fn with_retry<F, Op, Fut, Res>(
    session: &mut F::Session,
    factory: &F,
    max_backoff: Duration,
    mut op: Op,
) -> Result<Res, RpcError>
where
    F: SessionFactory,
    Op: FnMut(&F::Session) -> Fut,
    Fut: Future<Output = Result<Res, RpcError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op(session).await {
            Ok(res) => return Ok(res),
            Err(err) if err.is_transport() => {
                let delay = backoff_delay(attempt, max_backoff);
                warn!(attempt, %err, delay_ms = delay.as_millis() as u64, "rpc transport error, reconnecting");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
                *session = factory.connect().await?;
            },
            Err(app_err) => return Err(app_err),
        }
    }
}

/// Full-jitter exponential backoff: `uniform(0, min(max, base * 2^attempt))`.
fn backoff_delay(attempt: u32, max_backoff: Duration) -> Duration {
    const BASE_MS: u64 = 200;
    let exp = attempt.min(20);
    let capped_ms = BASE_MS
        .saturating_mul(1u64 << exp)
        .min(max_backoff.as_millis() as u64)
        .max(1);
    let jitter_ms = rand::rng().random_range(0..=capped_ms);
    Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::rpc::mock::MockSession;

    struct CountingFactory {
        connects: AtomicU32,
    }

    impl SessionFactory for CountingFactory {
        type Session = MockSession;

        async fn connect(&self) -> Result<MockSession, RpcError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(MockSession::default())
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let factory = CountingFactory {
            connects: AtomicU32::new(0),
        };
        let mut session = factory.connect().await.expect("initial connect");
        let mut calls = 0u32;

        let result = with_retry(
            &mut session,
            &factory,
            Duration::from_millis(1),
            |_session| {
                calls += 1;
                let this_call = calls;
                async move {
                    if this_call <= 3 {
                        Err(RpcError::Transport("connection closed".to_string()))
                    } else {
                        Ok(this_call)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.expect("eventually succeeds"), 4);
        assert_eq!(factory.connects.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn surfaces_application_errors_immediately() {
        let factory = CountingFactory {
            connects: AtomicU32::new(0),
        };
        let mut session = factory.connect().await.expect("initial connect");

        let result: Result<(), RpcError> = with_retry(
            &mut session,
            &factory,
            Duration::from_millis(1),
            |_session| async {
                Err(RpcError::Application {
                    name: "DataStore::NotFound".to_string(),
                    message: "no such object".to_string(),
                })
            },
        )
        .await;

        assert!(matches!(result, Err(RpcError::Application { .. })));
        // Only the caller's initial connect happened; the wrapper never
        // reconnects on an application error.
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
    }
}
