//! # Committed Read and Lock Discipline Tests
//!
//! Buffered-strategy behavior under interleaved and concurrent handles:
//! readers never observe a partial write, and the wrapped resource's
//! advisory lock is held exactly while any handle is open.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use tamper_core::{LocatorError, MemoryStore, ResourceLocator, TamperEvident};
use tamper_guard::{BufferedLocator, DigestingFactory, GuardConfig};

fn buffered(store: &Arc<MemoryStore>, path: &str) -> Arc<BufferedLocator> {
    BufferedLocator::new(store.locator(path), DigestingFactory::new(GuardConfig::default()))
}

fn read_all(loc: &dyn ResourceLocator) -> Result<Vec<u8>, LocatorError> {
    let mut out = Vec::new();
    loc.open_read()?.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn unflushed_write_is_invisible_to_readers() {
    let store = MemoryStore::new();
    store.write("/doc", b"before".to_vec());
    let loc = buffered(&store, "/doc");

    let mut writer = loc.open_write().unwrap();
    writer.write_all(b"after").unwrap();

    let mut early = loc.open_read().unwrap();
    assert_eq!(read_all(&*loc).unwrap(), b"before");

    writer.flush().unwrap();
    assert_eq!(read_all(&*loc).unwrap(), b"after");

    // A reader opened before the flush keeps its committed view.
    let mut seen = Vec::new();
    early.read_to_end(&mut seen).unwrap();
    assert_eq!(seen, b"before");

    drop(writer);
    loc.checkpoint().unwrap();
}

#[test]
fn partially_consumed_reader_is_not_disturbed_by_flush() {
    let store = MemoryStore::new();
    store.write("/doc", b"0123456789".to_vec());
    let loc = buffered(&store, "/doc");

    let mut reader = loc.open_read().unwrap();
    let mut head = [0u8; 4];
    reader.read_exact(&mut head).unwrap();

    let mut writer = loc.open_write().unwrap();
    writer.write_all(b"abcdefghij").unwrap();
    drop(writer);

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(&head, b"0123");
    assert_eq!(rest, b"456789");
}

#[test]
fn last_flush_wins() {
    let store = MemoryStore::new();
    store.write("/doc", b"base".to_vec());
    let loc = buffered(&store, "/doc");

    let mut first = loc.open_write().unwrap();
    let mut second = loc.open_write().unwrap();
    first.write_all(b"first").unwrap();
    second.write_all(b"second").unwrap();
    second.flush().unwrap();
    first.flush().unwrap();
    drop(first);
    drop(second);

    assert_eq!(read_all(&*loc).unwrap(), b"first");
    assert_eq!(store.read("/doc").unwrap(), b"first");
    loc.checkpoint().unwrap();
}

#[test]
fn empty_write_stream_truncates() {
    let store = MemoryStore::new();
    store.write("/doc", b"content".to_vec());
    let loc = buffered(&store, "/doc");
    drop(loc.open_write().unwrap());
    assert_eq!(store.read("/doc").unwrap(), b"");
    loc.checkpoint().unwrap();
}

#[test]
fn balanced_handles_hold_lock_throughout_and_release_once() {
    let store = MemoryStore::new();
    store.write("/doc", b"data".to_vec());
    let lock = store.lock_for("/doc");
    let loc = buffered(&store, "/doc");
    assert!(!lock.is_held());

    let r1 = loc.open_read().unwrap();
    assert!(lock.is_held());
    let w1 = loc.open_write().unwrap();
    let r2 = loc.open_read().unwrap();
    drop(r1);
    assert!(lock.is_held());
    let ra = loc.open_random_access().unwrap();
    drop(w1);
    assert!(lock.is_held());
    drop(r2);
    assert!(lock.is_held());
    assert_eq!(loc.ref_count(), 1);
    drop(ra);

    assert!(!lock.is_held());
    assert_eq!(loc.ref_count(), 0);
    assert_eq!(lock.acquisitions(), 1);
    assert_eq!(lock.releases(), 1);
}

#[test]
fn lock_is_retaken_after_full_release() {
    let store = MemoryStore::new();
    store.write("/doc", b"data".to_vec());
    let lock = store.lock_for("/doc");
    let loc = buffered(&store, "/doc");

    for _ in 0..3 {
        let _ = read_all(&*loc).unwrap();
    }
    assert_eq!(lock.acquisitions(), 3);
    assert_eq!(lock.releases(), 3);
    assert!(!lock.is_held());
}

#[test]
fn failed_open_does_not_leak_a_reference() {
    let store = MemoryStore::new();
    store.write("/doc", b"trusted".to_vec());
    let lock = store.lock_for("/doc");
    let loc = buffered(&store, "/doc");

    store.write("/doc", b"forged".to_vec());
    assert!(loc.open_read().err().is_some_and(|e| e.is_integrity()));
    assert_eq!(loc.ref_count(), 0);
    assert!(!lock.is_held());
}

#[test]
fn concurrent_readers_only_see_complete_writes() {
    const LEN: usize = 4096;
    let store = MemoryStore::new();
    store.write("/doc", vec![0u8; LEN]);
    let loc = buffered(&store, "/doc");

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 1..=40u8 {
                let mut writer = loc.open_write().unwrap();
                for chunk in vec![round; LEN].chunks(512) {
                    writer.write_all(chunk).unwrap();
                }
                writer.flush().unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let content = read_all(&*loc).unwrap();
                    assert_eq!(content.len(), LEN);
                    let first = content[0];
                    assert!(content.iter().all(|&b| b == first), "torn read observed");
                }
            });
        }
    });

    assert_eq!(store.read("/doc").unwrap(), vec![40u8; LEN]);
    loc.checkpoint().unwrap();
    assert_eq!(loc.ref_count(), 0);
    let lock = store.lock_for("/doc");
    assert!(!lock.is_held());
    assert_eq!(lock.acquisitions(), lock.releases());
}

#[test]
fn concurrent_checkpoints_during_writes_never_fail() {
    let store = MemoryStore::new();
    store.write("/doc", b"v0".to_vec());
    let loc = buffered(&store, "/doc");

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..50 {
                let mut writer = loc.open_write().unwrap();
                writer.write_all(format!("v{round}").as_bytes()).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..50 {
                loc.checkpoint().unwrap();
            }
        });
    });
}
