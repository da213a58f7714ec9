//! Shared helpers for integration tests.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Poll `condition` every few milliseconds until it holds or `limit` passes.
pub async fn wait_until<F, Fut>(limit: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(limit, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
