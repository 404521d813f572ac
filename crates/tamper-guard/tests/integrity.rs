//! # Integrity Contract Tests
//!
//! Exercises the tamper-evident contract end to end through the factory,
//! for both strategies where the behavior is shared:
//!
//! - write, flush, read back and checkpoint;
//! - detection of changes made behind the locator's back;
//! - `ensure_equal` between guarded locators and against plain ones;
//! - resources that do not exist yet, and construction failures that are
//!   deferred to the first content access;
//! - re-wrapping of every locator reached through structural navigation.

use std::io::{Read, Write};
use std::sync::Arc;

use proptest::prelude::*;
use tamper_core::{
    DigestAlgorithm, FsLocator, LocatorError, MemoryStore, ResourceLocator, TamperEvident,
};
use tamper_guard::{DigestingFactory, GuardConfig, Strategy};

const STRATEGIES: [Strategy; 2] = [Strategy::Buffered, Strategy::Passthrough];

fn factory(strategy: Strategy) -> Arc<DigestingFactory> {
    DigestingFactory::new(GuardConfig {
        strategy,
        ..GuardConfig::default()
    })
}

fn guard(
    factory: &Arc<DigestingFactory>,
    store: &Arc<MemoryStore>,
    path: &str,
) -> Arc<dyn TamperEvident> {
    let location: Arc<dyn ResourceLocator> = store.locator(path);
    factory.create(location)
}

fn read_all(loc: &dyn ResourceLocator) -> Result<Vec<u8>, LocatorError> {
    let mut out = Vec::new();
    loc.open_read()?.read_to_end(&mut out)?;
    Ok(out)
}

fn write_all(loc: &dyn ResourceLocator, bytes: &[u8]) -> Result<(), LocatorError> {
    let mut stream = loc.open_write()?;
    stream.write_all(bytes)?;
    stream.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn written_bytes_read_back_and_checkpoint(
        bytes in prop::collection::vec(any::<u8>(), 0..4096),
        passthrough in any::<bool>(),
    ) {
        let strategy = if passthrough { Strategy::Passthrough } else { Strategy::Buffered };
        let store = MemoryStore::new();
        store.write("/doc", b"seed".to_vec());
        let factory = factory(strategy);
        let loc = guard(&factory, &store, "/doc");

        write_all(&*Arc::clone(&loc).into_locator(), &bytes).unwrap();
        prop_assert_eq!(read_all(&*Arc::clone(&loc).into_locator()).unwrap(), bytes.clone());
        prop_assert!(loc.checkpoint().is_ok());
        prop_assert_eq!(loc.snapshot(), Some(factory.digest_bytes(&bytes).unwrap()));
    }
}

// ---------------------------------------------------------------------------
// Tamper detection
// ---------------------------------------------------------------------------

#[test]
fn external_mutation_fails_checkpoint() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/doc", b"trusted".to_vec());
        let loc = guard(&factory(strategy), &store, "/doc");
        loc.checkpoint().unwrap();

        store.write("/doc", b"trusted!".to_vec());
        let err = loc.checkpoint().unwrap_err();
        assert!(err.is_integrity(), "{strategy}: expected integrity error, got {err}");
        assert!(matches!(err, LocatorError::Integrity { .. }));
    }
}

#[test]
fn integrity_failure_is_not_auto_resynced() {
    let store = MemoryStore::new();
    store.write("/doc", b"trusted".to_vec());
    let loc = guard(&factory(Strategy::Buffered), &store, "/doc");
    let before = loc.snapshot();

    store.write("/doc", b"forged".to_vec());
    assert!(loc.checkpoint().unwrap_err().is_integrity());
    assert!(loc.checkpoint().unwrap_err().is_integrity());
    assert_eq!(loc.snapshot(), before);
}

#[test]
fn checkpoint_is_idempotent() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/doc", b"stable".to_vec());
        let loc = guard(&factory(strategy), &store, "/doc");
        let before = loc.snapshot();
        loc.checkpoint().unwrap();
        loc.checkpoint().unwrap();
        assert_eq!(loc.snapshot(), before);
    }
}

#[test]
fn writes_through_the_locator_are_not_tampering() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/doc", b"v1".to_vec());
        let loc = guard(&factory(strategy), &store, "/doc");
        write_all(&*Arc::clone(&loc).into_locator(), b"v2").unwrap();
        loc.checkpoint().unwrap();
        assert_eq!(store.read("/doc").unwrap(), b"v2");
    }
}

#[test]
fn filesystem_tampering_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.txt");
    std::fs::write(&path, b"balance=100").unwrap();

    let factory = factory(Strategy::Buffered);
    let location: Arc<dyn ResourceLocator> = Arc::new(FsLocator::new(&path));
    let loc = factory.create(location);
    assert_eq!(read_all(&*Arc::clone(&loc).into_locator()).unwrap(), b"balance=100");

    write_all(&*Arc::clone(&loc).into_locator(), b"balance=200").unwrap();
    loc.checkpoint().unwrap();

    std::fs::write(&path, b"balance=999").unwrap();
    assert!(loc.checkpoint().unwrap_err().is_integrity());
}

// ---------------------------------------------------------------------------
// ensure_equal
// ---------------------------------------------------------------------------

#[test]
fn ensure_equal_over_identical_content() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/a", b"same".to_vec());
        store.write("/b", b"same".to_vec());
        let factory = factory(strategy);
        let a = guard(&factory, &store, "/a");
        let b = guard(&factory, &store, "/b");
        a.ensure_equal(&*Arc::clone(&b).into_locator()).unwrap();
        b.ensure_equal(&*Arc::clone(&a).into_locator()).unwrap();
    }
}

#[test]
fn ensure_equal_over_different_content() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/a", b"left".to_vec());
        store.write("/b", b"right".to_vec());
        let factory = factory(strategy);
        let a = guard(&factory, &store, "/a");
        let b = guard(&factory, &store, "/b");
        let err = a.ensure_equal(&*Arc::clone(&b).into_locator()).unwrap_err();
        assert!(err.is_integrity(), "{strategy}: got {err}");
    }
}

#[test]
fn ensure_equal_follows_writes() {
    let store = MemoryStore::new();
    store.write("/a", b"same".to_vec());
    store.write("/b", b"same".to_vec());
    let factory = factory(Strategy::Buffered);
    let a = guard(&factory, &store, "/a");
    let b = guard(&factory, &store, "/b");
    let b_plain = Arc::clone(&b).into_locator();

    write_all(&*b_plain, b"changed").unwrap();
    assert!(a.ensure_equal(&*b_plain).unwrap_err().is_integrity());
    write_all(&*Arc::clone(&a).into_locator(), b"changed").unwrap();
    a.ensure_equal(&*b_plain).unwrap();
}

#[test]
fn ensure_equal_against_plain_locator_is_incomparable() {
    let store = MemoryStore::new();
    store.write("/a", b"x".to_vec());
    store.write("/b", b"x".to_vec());
    let a = guard(&factory(Strategy::Buffered), &store, "/a");
    let err = a.ensure_equal(&*store.locator("/b")).unwrap_err();
    assert!(matches!(err, LocatorError::Incomparable { .. }), "got {err}");
    assert!(!err.is_integrity());
}

#[test]
fn ensure_equal_across_algorithms_is_incomparable() {
    let store = MemoryStore::new();
    store.write("/a", b"x".to_vec());
    store.write("/b", b"x".to_vec());
    let a = guard(&factory(Strategy::Buffered), &store, "/a");
    let sha256 = DigestingFactory::new(GuardConfig {
        algorithm: DigestAlgorithm::Sha256,
        ..GuardConfig::default()
    });
    let b = guard(&sha256, &store, "/b");
    let err = a.ensure_equal(&*Arc::clone(&b).into_locator()).unwrap_err();
    assert!(matches!(err, LocatorError::Incomparable { .. }), "got {err}");
}

#[test]
fn ensure_equal_without_own_snapshot_succeeds() {
    let store = MemoryStore::new();
    store.write("/b", b"anything".to_vec());
    let factory = factory(Strategy::Buffered);
    let a = guard(&factory, &store, "/missing");
    let b = guard(&factory, &store, "/b");
    assert!(a.snapshot().is_none());
    a.ensure_equal(&*Arc::clone(&b).into_locator()).unwrap();
}

#[test]
fn ensure_equal_checkpoints_peer_without_snapshot() {
    let store = MemoryStore::new();
    store.write("/a", b"content".to_vec());
    let factory = factory(Strategy::Buffered);
    let a = guard(&factory, &store, "/a");
    let b = guard(&factory, &store, "/b");
    assert!(b.snapshot().is_none());

    // The peer is absent, which digests as empty content.
    assert!(a.ensure_equal(&*Arc::clone(&b).into_locator()).unwrap_err().is_integrity());
    assert_eq!(b.snapshot(), Some(factory.empty_digest().unwrap()));
}

// ---------------------------------------------------------------------------
// Construction outcomes
// ---------------------------------------------------------------------------

#[test]
fn missing_resource_has_no_snapshot_until_checkpoint() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        let factory = factory(strategy);
        let loc = guard(&factory, &store, "/new");
        assert!(loc.snapshot().is_none());
        assert!(!loc.exists());

        loc.checkpoint().unwrap();
        assert_eq!(loc.snapshot(), Some(factory.empty_digest().unwrap()));
        assert!(!loc.exists(), "{strategy}: checkpoint must not create the resource");

        write_all(&*Arc::clone(&loc).into_locator(), b"hello").unwrap();
        assert!(loc.exists());
        loc.checkpoint().unwrap();
        assert_eq!(loc.snapshot(), Some(factory.digest_bytes(b"hello").unwrap()));
    }
}

#[test]
fn missing_resource_reads_as_not_found_not_integrity() {
    let store = MemoryStore::new();
    let loc = guard(&factory(Strategy::Buffered), &store, "/new");
    let err = read_all(&*Arc::clone(&loc).into_locator()).unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_integrity());
}

#[test]
fn construction_failure_is_deferred_and_sticky() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/flaky", b"data".to_vec());
        store.inject_fault("/flaky");
        let loc = guard(&factory(strategy), &store, "/flaky");
        store.clear_fault("/flaky");

        assert!(loc.snapshot().is_none());
        let plain = Arc::clone(&loc).into_locator();
        for _ in 0..2 {
            let err = read_all(&*plain).unwrap_err();
            assert!(
                matches!(err, LocatorError::DeferredConstruction { .. }),
                "{strategy}: got {err}"
            );
            assert!(!err.is_integrity());
            assert!(!err.is_not_found());
        }
        assert!(matches!(
            loc.checkpoint(),
            Err(LocatorError::DeferredConstruction { .. })
        ));
        assert!(matches!(
            plain.open_write().err(),
            Some(LocatorError::DeferredConstruction { .. })
        ));
        assert!(loc.exists());
    }
}

#[test]
fn deferred_error_keeps_its_source() {
    let store = MemoryStore::new();
    store.write("/flaky", b"data".to_vec());
    store.inject_fault("/flaky");
    let loc = guard(&factory(Strategy::Buffered), &store, "/flaky");
    let err = loc.checkpoint().unwrap_err();
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert!(source.unwrap_or_default().contains("injected fault"));
}

// ---------------------------------------------------------------------------
// Structural navigation
// ---------------------------------------------------------------------------

#[test]
fn navigation_rewraps_every_locator() {
    let store = MemoryStore::new();
    store.write("/dir/a", b"1".to_vec());
    store.write("/dir/b", b"2".to_vec());
    store.write("/dir/sub/c", b"3".to_vec());
    let factory = factory(Strategy::Buffered);
    let dir = guard(&factory, &store, "/dir");

    let child = dir.child("a").unwrap().unwrap();
    assert!(child.as_tamper_evident().is_some());
    assert_eq!(child.path(), "/dir/a");

    let parent = child.parent().unwrap();
    assert!(parent.as_tamper_evident().is_some());
    assert_eq!(parent.path(), "/dir");

    let listed = dir.list_children(&|_| true).unwrap();
    let names: Vec<&str> = listed.iter().map(|l| l.name()).collect();
    assert_eq!(names, ["a", "b", "sub"]);
    assert!(listed.iter().all(|l| l.as_tamper_evident().is_some()));

    let filtered = dir.list_children(&|name| name != "sub").unwrap();
    assert_eq!(filtered.len(), 2);
}

#[test]
fn one_instance_per_path_while_alive() {
    let store = MemoryStore::new();
    store.write("/dir/a", b"1".to_vec());
    let factory = factory(Strategy::Buffered);
    let dir = guard(&factory, &store, "/dir");

    let first = dir.guarded_child("a").unwrap().unwrap();
    let second = dir.guarded_child("a").unwrap().unwrap();
    let direct = guard(&factory, &store, "/dir/a");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &direct));
}

#[test]
fn guarded_child_detects_tampering_below_the_root() {
    let store = MemoryStore::new();
    store.write("/tree/leaf", b"original".to_vec());
    let factory = factory(Strategy::Buffered);
    let root = guard(&factory, &store, "/tree");
    let leaf = root.guarded_child("leaf").unwrap().unwrap();

    store.write("/tree/leaf", b"replaced".to_vec());
    assert!(leaf.checkpoint().unwrap_err().is_integrity());
}

#[test]
fn rename_returns_guarded_locator() {
    for strategy in STRATEGIES {
        let store = MemoryStore::new();
        store.write("/dir/old", b"content".to_vec());
        let factory = factory(strategy);
        let loc = guard(&factory, &store, "/dir/old");

        let renamed = loc.rename("new").unwrap();
        let guarded = renamed.as_tamper_evident().unwrap();
        assert_eq!(renamed.path(), "/dir/new");
        assert!(!store.locator("/dir/old").exists());
        assert_eq!(guarded.snapshot(), Some(factory.digest_bytes(b"content").unwrap()));
        guarded.checkpoint().unwrap();
    }
}

#[test]
fn invalid_child_names_are_rejected() {
    let store = MemoryStore::new();
    let dir = guard(&factory(Strategy::Buffered), &store, "/dir");
    for name in ["", ".", "..", "a/b"] {
        assert!(
            matches!(dir.child(name), Err(LocatorError::InvalidName(_))),
            "accepted {name:?}"
        );
    }
}

#[test]
fn equality_follows_wrapped_path() {
    let store = MemoryStore::new();
    store.write("/a", b"x".to_vec());
    let one = tamper_guard::BufferedLocator::new(store.locator("/a"), factory(Strategy::Buffered));
    let two = tamper_guard::BufferedLocator::new(store.locator("/a"), factory(Strategy::Buffered));
    assert_eq!(*one, *two);
}
