//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::memory::InMemoryBackend;
use advisory_lock_core::DistributedLock;

/// Installs a fmt subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A lock on `store` as seen from a separate process: every acquisition
/// opens its own session.
pub fn lock_on(store: &Arc<InMemoryBackend>, name: &str) -> DistributedLock<InMemoryBackend> {
    DistributedLock::new(name, Arc::clone(store)).unwrap()
}

/// Waits until nobody holds `name`, e.g. after a handle was dropped and its
/// release runs in the background.
pub async fn wait_until_free(store: &InMemoryBackend, name: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.is_held(name) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
