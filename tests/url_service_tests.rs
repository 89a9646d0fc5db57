//! Creation and resolution pipeline scenarios.

mod common;

use std::sync::atomic::Ordering;

use common::{build_core, fast_retry_config};
use linkcut::errors::LinkcutError;

#[tokio::test]
async fn test_happy_path_creation_and_cached_resolve() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc"]);

    let short = core
        .service
        .create_short("https://example.com/a", Some("u1"))
        .await
        .unwrap();
    assert_eq!(short, "http://localhost:8080/abc");

    // The committed mapping was back-filled into the cache.
    let resolved = core.service.resolve("abc", Some("u1")).await.unwrap();
    assert_eq!(resolved.url, "https://example.com/a");
    assert!(resolved.from_cache);
}

#[tokio::test]
async fn test_repeat_creation_deduplicates() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc", "def"]);

    let first = core
        .service
        .create_short("https://example.com/a", Some("u1"))
        .await
        .unwrap();
    let puts_after_first = core.cache.put_calls();

    let second = core
        .service
        .create_short("https://example.com/a", Some("u2"))
        .await
        .unwrap();

    assert_eq!(first, second);
    // Exactly one pool hash consumed across both calls.
    assert_eq!(core.pool.len(), 1);
    assert_eq!(core.url_store.row_count(), 1);
    // The dedup hit refreshed the cache TTL with another put.
    assert!(core.cache.put_calls() > puts_after_first);
}

#[tokio::test]
async fn test_concurrent_creation_converges_on_one_hash() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["aaa", "bbb"]);

    let (left, right) = tokio::join!(
        core.service.create_short("https://example.com/b", Some("u1")),
        core.service.create_short("https://example.com/b", Some("u2")),
    );

    let left = left.unwrap();
    let right = right.unwrap();
    assert_eq!(left, right);
    assert_eq!(core.url_store.row_count(), 1);
    // Net pool change is one hash: the loser returned its claim.
    assert_eq!(core.pool.len(), 1);
}

#[tokio::test]
async fn test_dedup_via_reverse_table() {
    let core = build_core(fast_retry_config());
    // Another instance already committed this URL under "win".
    core.url_store.seed("win", "https://example.com/c");
    core.pool.seed(&["xyz"]);

    // Dedup via the reverse table: no pool hash is consumed.
    let short = core
        .service
        .create_short("https://example.com/c", Some("u1"))
        .await
        .unwrap();
    assert_eq!(short, "http://localhost:8080/win");
    assert_eq!(core.pool.len(), 1);
}

#[tokio::test]
async fn test_url_conflict_returns_winner_hash_and_reclaims_loser() {
    let core = build_core(fast_retry_config());
    // The winner's commit is visible to the unique index but not yet to
    // this instance's dedup lookup.
    core.url_store.seed("win", "https://example.com/c");
    core.url_store.suppress_url_lookups(1);
    core.pool.seed(&["xyz"]);

    let short = core
        .service
        .create_short("https://example.com/c", Some("u1"))
        .await
        .unwrap();

    assert_eq!(short, "http://localhost:8080/win");
    // The losing claim went back into the pool.
    assert_eq!(core.pool.len(), 1);
    assert_eq!(core.metrics.url_conflicts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validation_rejects_before_any_store_access() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc"]);

    for bad in [
        "javascript:alert(1)",
        "data:text/html,x",
        "//protocol-relative.com",
        "",
    ] {
        let result = core.service.create_short(bad, Some("u1")).await;
        assert!(matches!(result, Err(LinkcutError::InvalidUrl(_))), "{}", bad);
    }

    assert_eq!(core.url_store.insert_calls(), 0);
    assert_eq!(core.url_store.row_count(), 0);
    assert_eq!(core.pool.len(), 1);
}

#[tokio::test]
async fn test_max_length_boundary() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc", "def"]);
    let max = core.config.url_validation.max_length;

    let base = "https://example.com/";
    let at_limit = format!("{}{}", base, "a".repeat(max - base.len()));
    assert!(core.service.create_short(&at_limit, Some("u1")).await.is_ok());

    let over_limit = format!("{}{}", base, "a".repeat(max - base.len() + 1));
    assert!(matches!(
        core.service.create_short(&over_limit, Some("u1")).await,
        Err(LinkcutError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_bare_host_normalized_to_https() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc"]);

    let short = core
        .service
        .create_short("example.com/path", Some("u1"))
        .await
        .unwrap();

    let hash = short.rsplit('/').next().unwrap();
    let resolved = core.service.resolve(hash, None).await.unwrap();
    assert_eq!(resolved.url, "https://example.com/path");
}

#[tokio::test]
async fn test_resolve_unknown_hash_is_not_found() {
    let core = build_core(fast_retry_config());

    let result = core.service.resolve("nope", None).await;
    assert!(matches!(result, Err(LinkcutError::NotFound(_))));
}

#[tokio::test]
async fn test_resolve_falls_back_to_store_and_repairs_cache() {
    let core = build_core(fast_retry_config());
    core.url_store.seed("abc", "https://example.com/x");

    let first = core.service.resolve("abc", None).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(core.cache.cached_url("abc").as_deref(), Some("https://example.com/x"));

    let second = core.service.resolve("abc", None).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.url, first.url);
}

#[tokio::test]
async fn test_resolve_is_a_pure_read() {
    let core = build_core(fast_retry_config());
    core.url_store.seed("abc", "https://example.com/x");
    core.hash_store.seed_used(&["abc"]);

    for _ in 0..3 {
        core.service.resolve("abc", None).await.unwrap();
    }

    assert_eq!(core.url_store.row_count(), 1);
    assert_eq!(core.hash_store.availability("abc"), Some(false));
}

#[tokio::test]
async fn test_redirect_hook_blocks_blacklisted_target() {
    let mut config = fast_retry_config();
    config
        .redirect_validation
        .blacklisted_domains
        .push("evil.com".to_string());
    let core = build_core(config);
    // Row predates the blacklist entry.
    core.url_store.seed("abc", "https://evil.com/x");

    let result = core.service.resolve("abc", None).await;
    assert!(matches!(result, Err(LinkcutError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_cache_outage_changes_nothing_but_the_flag() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc"]);
    core.cache.set_failing(true);

    let short = core
        .service
        .create_short("https://example.com/a", Some("u1"))
        .await
        .unwrap();
    assert_eq!(short, "http://localhost:8080/abc");
    assert!(core.url_store.contains_hash("abc"));

    // Resolution succeeds off the durable store; only the flag differs.
    let resolved = core.service.resolve("abc", None).await.unwrap();
    assert_eq!(resolved.url, "https://example.com/a");
    assert!(!resolved.from_cache);
}

#[tokio::test]
async fn test_outer_retry_survives_transient_integrity_violation() {
    let core = build_core(fast_retry_config());
    core.pool.seed(&["abc", "def"]);
    core.url_store.fail_inserts_with_integrity(1);

    let short = core
        .service
        .create_short("https://example.com/a", Some("u1"))
        .await
        .unwrap();
    assert!(core.url_store.row_count() == 1);
    assert!(short.starts_with("http://localhost:8080/"));
}

#[tokio::test]
async fn test_hash_collision_is_fatal_for_the_attempt() {
    let core = build_core(fast_retry_config());
    // "dup" is already linked to some other URL; the pool serves it first.
    core.url_store.seed("dup", "https://example.com/other");
    core.pool.seed(&["dup", "ok"]);

    let result = core
        .service
        .create_short("https://example.com/new", Some("u1"))
        .await;

    // The collision propagates; the outer retry only covers integrity
    // violations, so no fresh hash is claimed.
    assert!(matches!(result, Err(LinkcutError::HashCollision(_))));
    assert_eq!(core.metrics.url_conflicts.load(Ordering::SeqCst), 1);
    assert_eq!(core.pool.len(), 1);
    assert!(!core.url_store.contains_hash("ok"));
}

#[tokio::test]
async fn test_no_available_hash_surfaces_as_503_kind() {
    let core = build_core(fast_retry_config());
    core.hash_store.exhaust_sequence();

    let result = core
        .service
        .create_short("https://example.com/a", Some("u1"))
        .await;
    assert!(matches!(result, Err(LinkcutError::NoAvailableHash(_))));
}
