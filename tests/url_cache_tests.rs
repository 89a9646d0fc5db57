//! Two-direction URL cache contract.
//!
//! The cache is advisory and has no caller-side invalidation in the
//! pipelines (entries age out by TTL), so `delete` is pinned down here:
//! one call must remove both the forward and the reverse leg.

mod common;

use common::MemoryUrlCache;
use linkcut::cache::UrlCache;

#[tokio::test]
async fn test_put_writes_both_directions() {
    let cache = MemoryUrlCache::new();

    cache.put("abc", "https://example.com/a", 3600).await;

    assert_eq!(
        cache.get_by_hash("abc").await.as_deref(),
        Some("https://example.com/a")
    );
    assert_eq!(
        cache.get_hash_by_url("https://example.com/a").await.as_deref(),
        Some("abc")
    );
}

#[tokio::test]
async fn test_delete_removes_both_directions() {
    let cache = MemoryUrlCache::new();
    cache.put("abc", "https://example.com/a", 3600).await;
    cache.put("def", "https://example.com/b", 3600).await;

    cache.delete("abc").await;

    // Both legs of the deleted mapping are gone.
    assert_eq!(cache.get_by_hash("abc").await, None);
    assert_eq!(cache.get_hash_by_url("https://example.com/a").await, None);
    // Other mappings are untouched.
    assert_eq!(
        cache.get_by_hash("def").await.as_deref(),
        Some("https://example.com/b")
    );
    assert_eq!(
        cache.get_hash_by_url("https://example.com/b").await.as_deref(),
        Some("def")
    );
}

#[tokio::test]
async fn test_delete_of_absent_hash_is_a_no_op() {
    let cache = MemoryUrlCache::new();
    cache.put("abc", "https://example.com/a", 3600).await;

    cache.delete("missing").await;

    assert_eq!(
        cache.get_by_hash("abc").await.as_deref(),
        Some("https://example.com/a")
    );
}

#[tokio::test]
async fn test_put_overwrite_repoints_forward_leg() {
    let cache = MemoryUrlCache::new();
    cache.put("abc", "https://example.com/old", 3600).await;
    cache.put("abc", "https://example.com/new", 3600).await;

    assert_eq!(
        cache.get_by_hash("abc").await.as_deref(),
        Some("https://example.com/new")
    );
    assert_eq!(
        cache.get_hash_by_url("https://example.com/new").await.as_deref(),
        Some("abc")
    );
}
