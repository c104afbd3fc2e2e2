//! Lifecycle, allocation and concurrency tests against a real redb file.

use std::collections::HashSet;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use redb::ReadableTable;
use tempfile::TempDir;

use super::crypto::generate_key;
use super::db::{LINKS, SNIPPETS};
use super::model::{SECS_PER_DAY, SNIPPET_TTL_SECS};
use super::{Store, StoreOptions};
use crate::clock::ManualClock;
use crate::error::BlinkError;
use crate::ids::{IdSource, RandomIds, SeededIds};

const T0: i64 = 1_700_000_000;

struct Harness {
    store: Store,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn setup() -> Harness {
    setup_with_ids(Arc::new(SeededIds::new(1)))
}

fn setup_with_ids(ids: Arc<dyn IdSource>) -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let store = Store::open_with(
        &dir.path().join("blink.db"),
        generate_key(),
        StoreOptions {
            clock: clock.clone(),
            ids,
        },
    )
    .unwrap();
    Harness {
        store,
        clock,
        _dir: dir,
    }
}

/// Always draws the same identifiers, to force collisions.
struct FixedIds;

impl IdSource for FixedIds {
    fn snippet_code(&self) -> String {
        "4242".to_owned()
    }

    fn link_slug(&self) -> String {
        "fixed1".to_owned()
    }
}

fn stored_snippet_codes(store: &Store) -> Vec<String> {
    let read_txn = store.db.begin_read().unwrap();
    let table = read_txn.open_table(SNIPPETS).unwrap();
    table
        .iter()
        .unwrap()
        .map(|item| item.unwrap().0.value().to_owned())
        .collect()
}

fn stored_link_slugs(store: &Store) -> HashSet<String> {
    let read_txn = store.db.begin_read().unwrap();
    let table = read_txn.open_table(LINKS).unwrap();
    table
        .iter()
        .unwrap()
        .map(|item| item.unwrap().0.value().to_owned())
        .collect()
}

// ── Snippets ─────────────────────────────────────────────────────────────────

#[test]
fn single_view_snippet_serves_once() {
    let h = setup();
    let created = h.store.create_snippet("hi", false, Some(1)).unwrap();
    assert_eq!(created.expires_at, T0 + SNIPPET_TTL_SECS);

    let first = h.store.read_snippet(&created.code).unwrap();
    assert_eq!(first.content, "hi");
    assert_eq!(first.view_count, 1);
    assert_eq!(first.max_views, Some(1));

    let second = h.store.read_snippet(&created.code);
    assert!(matches!(second, Err(BlinkError::NotFound)));
    assert!(stored_snippet_codes(&h.store).is_empty());
}

#[test]
fn capped_snippet_serves_exactly_n_reads() {
    let h = setup();
    let code = h.store.create_snippet("body", false, Some(3)).unwrap().code;

    for expected in 1..=3 {
        let view = h.store.read_snippet(&code).unwrap();
        assert_eq!(view.view_count, expected);
        assert_eq!(view.content, "body");
    }
    assert!(matches!(
        h.store.read_snippet(&code),
        Err(BlinkError::NotFound)
    ));
}

#[test]
fn one_time_takes_precedence_over_max_views() {
    let h = setup();
    let code = h.store.create_snippet("once", true, Some(5)).unwrap().code;

    let view = h.store.read_snippet(&code).unwrap();
    assert_eq!(view.content, "once");
    assert!(view.is_one_time);
    assert_eq!(view.view_count, 1);

    for _ in 0..3 {
        assert!(matches!(
            h.store.read_snippet(&code),
            Err(BlinkError::NotFound)
        ));
    }
}

#[test]
fn uncapped_snippet_counts_every_read() {
    let h = setup();
    let code = h.store.create_snippet("many", false, None).unwrap().code;
    for expected in 1..=20 {
        assert_eq!(h.store.read_snippet(&code).unwrap().view_count, expected);
    }
}

#[test]
fn snippet_expires_after_ttl_without_sweep() {
    let h = setup();
    let code = h.store.create_snippet("ttl", false, None).unwrap().code;

    h.clock.advance(SNIPPET_TTL_SECS - 1);
    assert!(h.store.read_snippet(&code).is_ok());

    h.clock.advance(1);
    assert!(matches!(
        h.store.read_snippet(&code),
        Err(BlinkError::NotFound)
    ));
    // The failed read evicted it.
    assert!(stored_snippet_codes(&h.store).is_empty());
}

#[test]
fn malformed_and_unknown_codes() {
    let h = setup();
    assert!(matches!(
        h.store.read_snippet("12"),
        Err(BlinkError::Validation(_))
    ));
    assert!(matches!(
        h.store.read_snippet("abcd"),
        Err(BlinkError::Validation(_))
    ));
    assert!(matches!(
        h.store.read_snippet("9999"),
        Err(BlinkError::NotFound)
    ));
}

#[test]
fn unknown_code_does_not_wait_for_the_writer() {
    let h = setup();
    h.store.create_snippet("held", false, None).unwrap();

    // Hold the single write slot open while another thread misses.
    let held = h.store.db.begin_write().unwrap();
    let (tx, rx) = mpsc::channel();
    let store = h.store.clone();
    let reader = thread::spawn(move || {
        tx.send(store.read_snippet("0000")).ok();
    });

    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("miss blocked behind an open write transaction");
    assert!(matches!(outcome, Err(BlinkError::NotFound)));

    drop(held);
    reader.join().expect("reader join");
}

#[test]
fn snippet_input_validation() {
    let h = setup();
    assert!(matches!(
        h.store.create_snippet("   ", false, None),
        Err(BlinkError::Validation(_))
    ));
    assert!(matches!(
        h.store.create_snippet("x", false, Some(0)),
        Err(BlinkError::Validation(_))
    ));
    assert!(stored_snippet_codes(&h.store).is_empty());
}

#[test]
fn code_allocation_is_bounded_and_reuses_dead_codes() {
    let h = setup_with_ids(Arc::new(FixedIds));
    let first = h.store.create_snippet("a", false, None).unwrap();
    assert_eq!(first.code, "4242");

    assert!(matches!(
        h.store.create_snippet("b", false, None),
        Err(BlinkError::AllocationExhausted)
    ));
    // The live record was not overwritten.
    assert_eq!(h.store.read_snippet("4242").unwrap().content, "a");

    h.clock.advance(SNIPPET_TTL_SECS);
    let reused = h.store.create_snippet("c", false, None).unwrap();
    assert_eq!(reused.code, "4242");
    assert_eq!(h.store.read_snippet("4242").unwrap().content, "c");
}

#[test]
fn snippet_body_is_encrypted_at_rest() {
    let h = setup();
    let code = h
        .store
        .create_snippet("plaintext-marker", false, None)
        .unwrap()
        .code;

    let read_txn = h.store.db.begin_read().unwrap();
    let table = read_txn.open_table(SNIPPETS).unwrap();
    let raw = table.get(code.as_str()).unwrap().unwrap().value().to_vec();
    let needle = b"plaintext-marker";
    assert!(!raw.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn purge_removes_only_dead_snippets() {
    let h = setup();
    let old = h.store.create_snippet("old", false, None).unwrap().code;
    h.clock.advance(SNIPPET_TTL_SECS / 2);
    let fresh = h.store.create_snippet("fresh", false, None).unwrap().code;
    h.clock.advance(SNIPPET_TTL_SECS / 2);

    assert_eq!(h.store.purge_expired_snippets().unwrap(), 1);
    assert_eq!(stored_snippet_codes(&h.store), vec![fresh.clone()]);
    assert_ne!(old, fresh);
}

#[test]
fn delete_snippet_force_clears_expired_records() {
    let h = setup();
    let code = h.store.create_snippet("gone", false, None).unwrap().code;
    h.clock.advance(SNIPPET_TTL_SECS * 2);

    h.store.delete_snippet(&code).unwrap();
    assert!(matches!(
        h.store.delete_snippet(&code),
        Err(BlinkError::NotFound)
    ));
}

#[test]
fn concurrent_reads_of_last_view_have_one_winner() {
    let h = setup();
    let code = h.store.create_snippet("race", false, Some(1)).unwrap().code;

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let store = h.store.clone();
            let barrier = barrier.clone();
            let code = code.clone();
            thread::spawn(move || {
                barrier.wait();
                store.read_snippet(&code)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("reader join"))
        .collect();
    let served = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(served, 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(BlinkError::NotFound))));
}

// ── Links ────────────────────────────────────────────────────────────────────

#[test]
fn link_without_scheme_is_normalized_and_counts_hits() {
    let h = setup();
    let created = h.store.create_link("example.com/page", None, None).unwrap();
    assert_eq!(created.original_url, "https://example.com/page");
    assert_eq!(created.slug.len(), 6);
    assert_eq!(created.expires_at, None);

    let target = h.store.resolve_link(&created.slug).unwrap();
    assert_eq!(target, "https://example.com/page");

    let stats = h.store.link_stats(&created.slug).unwrap();
    assert_eq!(stats.hit_count, 1);
    assert!(!stats.is_expired);
}

#[test]
fn hit_count_tracks_redirects() {
    let h = setup();
    let slug = h.store.create_link("https://a.example", None, None).unwrap().slug;
    for _ in 0..7 {
        h.store.resolve_link(&slug).unwrap();
    }
    assert_eq!(h.store.link_stats(&slug).unwrap().hit_count, 7);
}

#[test]
fn taken_custom_slug_is_rejected_without_overwrite() {
    let h = setup();
    h.store
        .create_link("https://first.example", Some("promo"), None)
        .unwrap();

    let err = h
        .store
        .create_link("https://second.example", Some("promo"), None)
        .unwrap_err();
    assert!(matches!(err, BlinkError::SlugTaken));
    assert_eq!(
        h.store.resolve_link("promo").unwrap(),
        "https://first.example"
    );
}

#[test]
fn link_input_validation() {
    let h = setup();
    let cases = [
        h.store.create_link("not a url", None, None),
        h.store.create_link("ftp://example.com", None, None),
        h.store.create_link("https://example.com", Some("x"), None),
        h.store.create_link("https://example.com", Some("bad slug"), None),
        h.store.create_link("https://example.com", Some("health"), None),
        h.store.create_link("https://example.com", None, Some(0)),
    ];
    for case in cases {
        assert!(matches!(case, Err(BlinkError::Validation(_))), "{case:?}");
    }
    assert!(stored_link_slugs(&h.store).is_empty());
}

#[test]
fn expired_link_is_hidden_before_cleanup() {
    let h = setup();
    let created = h
        .store
        .create_link("https://soon.example", Some("soon"), Some(1))
        .unwrap();
    assert_eq!(created.expires_at, Some(T0 + SECS_PER_DAY));

    h.clock.advance(SECS_PER_DAY);
    assert!(matches!(
        h.store.resolve_link("soon"),
        Err(BlinkError::NotFound)
    ));
    assert!(matches!(
        h.store.link_stats("soon"),
        Err(BlinkError::NotFound)
    ));
    // Still physically stored until cleanup.
    assert!(stored_link_slugs(&h.store).contains("soon"));
    assert_eq!(h.store.scan_expired_links().unwrap(), vec!["soon".to_owned()]);
}

#[test]
fn cleanup_removes_exactly_the_expired_links() {
    let h = setup();
    h.store
        .create_link("https://one.example", Some("one-day"), Some(1))
        .unwrap();
    h.store
        .create_link("https://two.example", Some("two-days"), Some(2))
        .unwrap();
    h.store
        .create_link("https://forever.example", Some("forever"), None)
        .unwrap();

    h.clock.advance(SECS_PER_DAY);
    assert_eq!(h.store.cleanup_expired_links().unwrap(), 1);

    let remaining = stored_link_slugs(&h.store);
    let expected: HashSet<String> = ["two-days", "forever"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(remaining, expected);

    assert_eq!(h.store.cleanup_expired_links().unwrap(), 0);
}

#[test]
fn expired_slug_can_be_claimed_again() {
    let h = setup();
    h.store
        .create_link("https://old.example", Some("reuse"), Some(1))
        .unwrap();
    h.clock.advance(SECS_PER_DAY);

    h.store
        .create_link("https://new.example", Some("reuse"), None)
        .unwrap();
    assert_eq!(h.store.resolve_link("reuse").unwrap(), "https://new.example");
}

#[test]
fn slug_allocation_is_bounded() {
    let h = setup_with_ids(Arc::new(FixedIds));
    assert_eq!(
        h.store.create_link("https://a.example", None, None).unwrap().slug,
        "fixed1"
    );
    assert!(matches!(
        h.store.create_link("https://b.example", None, None),
        Err(BlinkError::AllocationExhausted)
    ));
}

#[test]
fn concurrent_generated_slugs_are_distinct() {
    let h = setup_with_ids(Arc::new(RandomIds));
    let workers = 32;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let store = h.store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store
                    .create_link(&format!("https://site.example/{i}"), None, None)
                    .expect("create link")
                    .slug
            })
        })
        .collect();

    let slugs: HashSet<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("creator join"))
        .collect();
    assert_eq!(slugs.len(), workers);
    assert_eq!(stored_link_slugs(&h.store), slugs);
}

#[test]
fn concurrent_custom_slug_has_one_winner() {
    let h = setup();
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["https://a.example", "https://b.example"]
        .into_iter()
        .map(|url| {
            let store = h.store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.create_link(url, Some("promo"), None)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("creator join"))
        .collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].slug, "promo");
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(BlinkError::SlugTaken)))
            .count(),
        1
    );
    assert_eq!(
        h.store.resolve_link("promo").unwrap(),
        winners[0].original_url
    );
}

#[test]
fn delete_link_ignores_expiry() {
    let h = setup();
    h.store
        .create_link("https://x.example", Some("drop-me"), Some(1))
        .unwrap();
    h.clock.advance(SECS_PER_DAY * 3);
    h.store.delete_link("drop-me").unwrap();
    assert!(matches!(
        h.store.delete_link("drop-me"),
        Err(BlinkError::NotFound)
    ));
}

// ── Admin aggregation ────────────────────────────────────────────────────────

#[test]
fn stats_cover_only_live_records() {
    let h = setup();
    h.store.create_snippet("live", false, None).unwrap();
    let burned = h.store.create_snippet("burn", true, None).unwrap().code;
    h.store.read_snippet(&burned).unwrap();

    h.store
        .create_link("https://a.example", Some("aaa"), None)
        .unwrap();
    h.store
        .create_link("https://b.example", Some("bbb"), Some(1))
        .unwrap();
    for _ in 0..3 {
        h.store.resolve_link("aaa").unwrap();
    }
    for _ in 0..2 {
        h.store.resolve_link("bbb").unwrap();
    }

    let stats = h.store.stats().unwrap();
    assert_eq!(stats.snippets, 1);
    assert_eq!(stats.links, 2);
    assert_eq!(stats.total_hits, 5);
    assert_eq!(stats.expired_links, 0);

    h.clock.advance(SECS_PER_DAY);
    let stats = h.store.stats().unwrap();
    assert_eq!(stats.snippets, 0);
    assert_eq!(stats.links, 1);
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.expired_links, 1);
}

#[test]
fn total_hits_equals_sum_of_link_counters() {
    let h = setup();
    let mut expected = 0;
    for (i, hits) in [4u64, 0, 9, 1].into_iter().enumerate() {
        let slug = h
            .store
            .create_link(&format!("https://s{i}.example"), None, None)
            .unwrap()
            .slug;
        for _ in 0..hits {
            h.store.resolve_link(&slug).unwrap();
        }
        expected += hits;
    }
    let listed: u64 = h
        .store
        .list_links(100)
        .unwrap()
        .iter()
        .map(|l| l.hit_count)
        .sum();
    assert_eq!(listed, expected);
    assert_eq!(h.store.stats().unwrap().total_hits, expected);
}

#[test]
fn listings_are_newest_first_and_bounded() {
    let h = setup();
    let mut codes = Vec::new();
    for i in 0..5 {
        codes.push(h.store.create_snippet(&format!("s{i}"), false, None).unwrap().code);
        h.store
            .create_link(
                &format!("https://l{i}.example"),
                Some(format!("link-{i}").as_str()),
                None,
            )
            .unwrap();
        h.clock.advance(1);
    }

    let snippets = h.store.list_snippets(3).unwrap();
    assert_eq!(snippets.len(), 3);
    assert_eq!(snippets[0].content, "s4");
    assert_eq!(snippets[0].code, codes[4]);
    assert_eq!(snippets[2].content, "s2");

    let links = h.store.list_links(2).unwrap();
    let slugs: Vec<_> = links.iter().map(|l| l.slug.as_str()).collect();
    assert_eq!(slugs, vec!["link-4", "link-3"]);

    // Listing is an inspection and must not count as a view.
    assert_eq!(h.store.read_snippet(&codes[4]).unwrap().view_count, 1);
}

#[test]
fn listings_flag_expired_records() {
    let h = setup();
    h.store.create_snippet("old", false, None).unwrap();
    h.store
        .create_link("https://x.example", Some("short"), Some(1))
        .unwrap();
    h.clock.advance(SECS_PER_DAY);

    assert!(h.store.list_snippets(10).unwrap()[0].is_expired);
    assert!(h.store.list_links(10).unwrap()[0].is_expired);
}
