//! Batch hash generation and the worker pool.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MemoryHashStore, RecordingMetrics};
use linkcut::codec;
use linkcut::services::{GeneratorPool, HashGenerator};
use linkcut::storage::{HashStore, RetryPolicy};

fn generator(store: Arc<MemoryHashStore>, batch_size: u64) -> Arc<HashGenerator> {
    Arc::new(HashGenerator::new(
        store,
        RecordingMetrics::new(),
        batch_size,
        RetryPolicy::new(2, 100),
    ))
}

#[tokio::test]
async fn test_generate_batch_persists_encoded_sequence() {
    let store = MemoryHashStore::new();
    let generated = generator(store.clone(), 10).generate_batch().await.unwrap();

    assert_eq!(generated, 10);
    assert_eq!(store.row_count(), 10);
    // Sequence values 1..=10, each Base62 encoded and available.
    for n in 1..=10u64 {
        assert_eq!(store.availability(&codec::encode(n)), Some(true));
    }
}

#[tokio::test]
async fn test_generate_batch_with_exhausted_sequence_is_empty_success() {
    let store = MemoryHashStore::new();
    store.exhaust_sequence();

    let generated = generator(store.clone(), 10).generate_batch().await.unwrap();
    assert_eq!(generated, 0);
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn test_generated_hashes_never_collide_across_batches() {
    let store = MemoryHashStore::new();
    let generator = generator(store.clone(), 50);

    generator.generate_batch().await.unwrap();
    generator.generate_batch().await.unwrap();

    // 100 distinct sequence values means 100 distinct rows.
    assert_eq!(store.row_count(), 100);
}

#[tokio::test]
async fn test_pool_executes_submitted_batches() {
    let store = MemoryHashStore::new();
    let pool = GeneratorPool::new(generator(store.clone(), 5), 2, 100);

    for _ in 0..4 {
        pool.submit().await;
    }

    // Fire-and-forget: wait for the workers to drain.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.row_count() < 20 {
        assert!(tokio::time::Instant::now() < deadline, "workers did not drain");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.row_count(), 20);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_pool_overflow_runs_on_caller() {
    let store = MemoryHashStore::new();
    // One worker, one queue slot: sustained submission must overflow.
    let pool = GeneratorPool::new(generator(store.clone(), 1), 1, 1);

    for _ in 0..10 {
        pool.submit().await;
    }
    pool.shutdown().await;

    // Every submission ran somewhere: worker or caller. Nothing dropped.
    assert_eq!(store.row_count(), 10);
}

#[tokio::test]
async fn test_insert_if_absent_is_idempotent() {
    let store = MemoryHashStore::new();
    let hashes = vec!["abc".to_string(), "def".to_string()];

    store.insert_if_absent(&hashes).await.unwrap();
    store.mark_used("abc").await.unwrap();
    // Re-inserting must not resurrect "abc" as available.
    store.insert_if_absent(&hashes).await.unwrap();

    assert_eq!(store.availability("abc"), Some(false));
    assert_eq!(store.availability("def"), Some(true));
}
