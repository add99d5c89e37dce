//! Lock semantics exercised against the in-memory coordination store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::memory::InMemoryBackend;
use advisory_lock_core::{DistributedLock, HandleState, LockError, LockOptions};
use tokio::time::Instant;

mod common;
use common::{init_tracing, lock_on, wait_until_free};

#[tokio::test]
async fn test_mutual_exclusion_no_lost_updates() {
    init_tracing();
    let store = Arc::new(InMemoryBackend::new());
    let counter = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicBool::new(false));

    const WORKERS: u64 = 8;
    const ROUNDS: u64 = 25;

    let mut tasks = Vec::new();
    for _ in 0..WORKERS {
        let lock = lock_on(&store, "shared-counter");
        let counter = Arc::clone(&counter);
        let inside = Arc::clone(&inside);
        tasks.push(tokio::spawn(async move {
            for _ in 0..ROUNDS {
                let mut handle = lock.acquire(Some(Duration::from_secs(30))).await.unwrap();
                assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");

                // Read-yield-write: loses updates unless access is exclusive.
                let value = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(value + 1, Ordering::SeqCst);

                inside.store(false, Ordering::SeqCst);
                handle.release().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), WORKERS * ROUNDS);
    assert_eq!(store.holder_count(), 0);
}

#[tokio::test]
async fn test_timeout_is_honored_not_early_not_late() {
    let store = Arc::new(InMemoryBackend::new());
    let _held = lock_on(&store, "busy").acquire(None).await.unwrap();

    let wait = Duration::from_millis(300);
    let start = std::time::Instant::now();
    let err = lock_on(&store, "busy").acquire(Some(wait)).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(elapsed >= wait, "gave up early after {elapsed:?}");
    assert!(elapsed < wait + Duration::from_millis(250), "gave up late after {elapsed:?}");
}

#[tokio::test]
async fn test_lock_released_when_store_kills_holder_session() {
    let store = Arc::new(InMemoryBackend::new());
    let mut holder = lock_on(&store, "job").acquire(None).await.unwrap();

    let waiter = {
        let lock = lock_on(&store, "job");
        tokio::spawn(async move { lock.acquire(Some(Duration::from_secs(5))).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The store notices the dead connection; the holder never releases.
    assert!(store.terminate_holder("job"));

    let mut second = waiter.await.unwrap().unwrap();
    assert!(second.is_held());

    let err = holder.check().await.unwrap_err();
    assert!(err.is_lost());
    assert_eq!(holder.state(), HandleState::Lost);
    assert!(holder.release().await.unwrap_err().is_lost());

    // The old holder's failure must not disturb the new holder.
    assert!(store.is_held("job"));
    second.release().await.unwrap();
}

#[tokio::test]
async fn test_lock_released_when_holder_task_dies() {
    let store = Arc::new(InMemoryBackend::new());
    let lock = lock_on(&store, "job");

    let holder = tokio::spawn(async move {
        let _handle = lock.acquire(None).await.unwrap();
        std::future::pending::<()>().await;
    });
    wait_until_held(&store, "job").await;

    holder.abort();
    let _ = holder.await;

    let next = lock_on(&store, "job")
        .acquire(Some(Duration::from_secs(5)))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let store = Arc::new(InMemoryBackend::new());
    let mut a = lock_on(&store, "a").acquire(None).await.unwrap();
    let b = lock_on(&store, "b").acquire(None).await.unwrap();

    a.release().await.unwrap();
    a.release().await.unwrap();
    assert_eq!(a.state(), HandleState::Released);
    // Nothing was lost, so probing a released handle is not an error.
    a.check().await.unwrap();

    assert!(b.is_held());
    assert!(store.is_held("b"));
    b.check().await.unwrap();
}

#[tokio::test]
async fn test_different_names_do_not_contend() {
    let store = Arc::new(InMemoryBackend::new());
    let _a = lock_on(&store, "A").acquire(None).await.unwrap();

    let b = lock_on(&store, "B").try_acquire(Duration::ZERO).await.unwrap();
    assert!(b.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_inventory_restock_waiter_gets_lock_when_released() {
    let store = Arc::new(InMemoryBackend::new());
    let start = Instant::now();

    let mut first = lock_on(&store, "inventory-restock")
        .acquire(Some(Duration::from_secs(10)))
        .await
        .unwrap();

    let second = {
        let lock = lock_on(&store, "inventory-restock");
        tokio::spawn(async move {
            let handle = lock.acquire(Some(Duration::from_secs(10))).await;
            (handle, Instant::now())
        })
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    first.release().await.unwrap();

    let (handle, acquired_at) = second.await.unwrap();
    assert!(handle.is_ok(), "second process must not time out");
    let waited = acquired_at - start;
    assert!(waited >= Duration::from_secs(2));
    assert!(waited < Duration::from_secs(3));
}

#[tokio::test]
async fn test_zero_timeout_try_acquire_is_immediate() {
    let store = Arc::new(InMemoryBackend::new());

    let start = std::time::Instant::now();
    let first = lock_on(&store, "x").try_acquire(Duration::ZERO).await.unwrap();
    let second = lock_on(&store, "x").try_acquire(Duration::ZERO).await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_abandoned_wait_leaves_no_waiter() {
    let store = Arc::new(InMemoryBackend::new());
    let mut holder = lock_on(&store, "x").acquire(None).await.unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        lock_on(&store, "x").acquire(None),
    )
    .await;
    assert!(abandoned.is_err());

    holder.release().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!store.is_held("x"), "a cancelled waiter must not get the lock");
}

#[tokio::test]
async fn test_unavailable_store_is_distinct_from_timeout() {
    let store = Arc::new(InMemoryBackend::new());
    store.set_available(false);

    let err = lock_on(&store, "x")
        .acquire(Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Unavailable(_)));
}

#[tokio::test]
async fn test_keepalive_signals_lost_token() {
    let store = Arc::new(InMemoryBackend::new());
    let options = LockOptions::new().keepalive_cadence(Duration::from_millis(20));
    let lock = DistributedLock::with_options("watched", Arc::clone(&store), options).unwrap();

    let handle = lock.acquire(None).await.unwrap();
    let mut lost = handle.lost_token().clone();
    assert!(!*lost.borrow());

    store.terminate_holder("watched");

    tokio::time::timeout(Duration::from_secs(2), lost.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(*lost.borrow());
    assert_eq!(handle.state(), HandleState::Lost);
}

#[tokio::test]
async fn test_dropping_handle_releases_lock() {
    let store = Arc::new(InMemoryBackend::new());
    let handle = lock_on(&store, "scoped").acquire(None).await.unwrap();
    drop(handle);

    wait_until_free(&store, "scoped").await;
}

#[test]
fn test_handle_dropped_outside_runtime_frees_lock() {
    let store = Arc::new(InMemoryBackend::new());
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let handle = runtime
        .block_on(lock_on(&store, "orphan").acquire(None))
        .unwrap();
    drop(runtime);

    assert!(store.is_held("orphan"));
    drop(handle);
    assert!(!store.is_held("orphan"));
}

#[tokio::test]
async fn test_outage_mid_wait_is_unavailable_not_timeout() {
    let store = Arc::new(InMemoryBackend::new());
    let _held = lock_on(&store, "x").acquire(None).await.unwrap();

    let outage = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            store.set_available(false);
        })
    };

    let start = std::time::Instant::now();
    let err = lock_on(&store, "x")
        .acquire(Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "expected unavailable, got {err:?}");
    assert!(start.elapsed() < Duration::from_millis(900));
    outage.await.unwrap();
}

#[tokio::test]
async fn test_run_exclusive_releases_when_closure_panics() {
    let store = Arc::new(InMemoryBackend::new());
    let lock = lock_on(&store, "panicky");

    let task = tokio::spawn(async move {
        lock.run_exclusive(None, || async {
            panic!("critical section failed");
        })
        .await
    });
    assert!(task.await.unwrap_err().is_panic());

    wait_until_free(&store, "panicky").await;
}

#[tokio::test]
async fn test_nested_acquire_of_same_name_waits_on_itself() {
    let store = Arc::new(InMemoryBackend::new());
    let lock = lock_on(&store, "outer");

    let _outer = lock.acquire(None).await.unwrap();
    let inner = lock.acquire(Some(Duration::from_millis(50))).await;
    assert!(inner.unwrap_err().is_timeout());
}

async fn wait_until_held(store: &InMemoryBackend, name: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !store.is_held(name) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
