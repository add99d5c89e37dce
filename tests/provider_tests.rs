//! Tests for provider abstraction.

use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::memory::{InMemoryBackend, InMemoryLockProvider};
use advisory_lock_core::{LockError, LockOptions, LockProvider, LockProviderExt};

mod common;

/// Tests that any provider can be used with the same code.
async fn test_provider_abstraction_with_name<P: LockProvider>(provider: &P, name: &str) {
    let lock = provider.create_lock(name).unwrap();
    assert_eq!(lock.name(), name);

    let handle = lock.try_acquire(Duration::ZERO).await.unwrap();
    assert!(handle.is_some());
    handle.unwrap().release().await.unwrap();

    // Now we should be able to acquire it again
    let handle2 = lock.try_acquire(Duration::ZERO).await.unwrap();
    assert!(handle2.is_some());
}

/// Tests provider extension methods work with any provider.
async fn test_provider_extensions_with_name<P: LockProvider + LockProviderExt>(
    provider: &P,
    name: &str,
) {
    let handle = provider
        .acquire_lock(name, Some(Duration::from_millis(100)))
        .await;
    assert!(handle.is_ok());

    // Should be None because the lock is held
    let handle2 = provider
        .try_acquire_lock(name, Duration::ZERO)
        .await
        .unwrap();
    assert!(handle2.is_none());
}

#[tokio::test]
async fn test_memory_provider_abstraction() {
    let provider = InMemoryLockProvider::new();
    test_provider_abstraction_with_name(&provider, "test-resource").await;
}

#[tokio::test]
async fn test_memory_provider_extensions() {
    let provider = InMemoryLockProvider::new();
    test_provider_extensions_with_name(&provider, "test-resource").await;
}

#[tokio::test]
async fn test_providers_sharing_a_store_contend() {
    let store = Arc::new(InMemoryBackend::new());
    let host_a = InMemoryLockProvider::with_backend(Arc::clone(&store));
    let host_b = InMemoryLockProvider::with_backend(Arc::clone(&store));

    let _held = host_a.acquire_lock("report", None).await.unwrap();
    let err = host_b
        .acquire_lock("report", Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout(_)));
}

#[tokio::test]
async fn test_provider_options_reach_locks() {
    let options = LockOptions::new()
        .keepalive_cadence(Duration::from_secs(1))
        .store_grace(Duration::from_secs(2));
    let provider = InMemoryLockProvider::new().options(options);

    let lock = provider.create_lock("configured").unwrap();
    assert_eq!(*lock.options(), options);
}

#[tokio::test]
async fn test_provider_rejects_empty_name() {
    let provider = InMemoryLockProvider::new();
    let err = provider.create_lock("").unwrap_err();
    assert!(matches!(err, LockError::InvalidName(_)));
}

#[tokio::test]
async fn test_provider_swappability() {
    // Code written against the trait works with any provider
    async fn use_any_provider<P: LockProvider>(provider: &P) {
        let lock = provider.create_lock("shared-resource").unwrap();
        let handle = lock.try_acquire(Duration::ZERO).await.unwrap();
        assert!(handle.is_some());
        handle.unwrap().release().await.unwrap();
    }

    use_any_provider(&InMemoryLockProvider::new()).await;
    use_any_provider(&InMemoryLockProvider::with_backend(Arc::new(
        InMemoryBackend::new(),
    )))
    .await;
}
