//! Example: Coordinating tasks with the in-memory backend
//!
//! Run with: `cargo run --example memory_lock`
//!
//! Two workers share one store, the way two processes share one database.
//! The second waits for the first to finish its critical section.

use std::sync::Arc;
use std::time::Duration;

use advisory_lock::*;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(InMemoryBackend::new());

    let mut workers = Vec::new();
    for worker in 0..2 {
        let provider = InMemoryLockProvider::with_backend(Arc::clone(&store));
        workers.push(tokio::spawn(async move {
            let lock = provider.create_lock("inventory-restock")?;
            let mut handle = lock.acquire(Some(Duration::from_secs(10))).await?;
            info!(worker, "restocking");
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.release().await?;
            info!(worker, "done");
            Ok::<_, LockError>(())
        }));
    }
    for worker in workers {
        worker.await??;
    }

    // A zero timeout asks once and returns immediately.
    let provider = InMemoryLockProvider::with_backend(Arc::clone(&store));
    let _held = provider.acquire_lock("report", None).await?;
    match provider.try_acquire_lock("report", Duration::ZERO).await? {
        Some(_) => warn!("report lock acquired twice"),
        None => info!("report lock is busy"),
    }

    Ok(())
}
