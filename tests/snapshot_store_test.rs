//! Concurrent readers against a publishing writer.

use obd_exporter::snapshot::{Snapshot, SnapshotStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const KEYS: usize = 8;
const PUBLISHES: usize = 2_000;
const READERS: usize = 4;

/// Snapshot number `generation`: every key carries the generation.
fn generation(generation: usize) -> Snapshot {
    (0..KEYS)
        .map(|key| (format!("Sensor{key}"), generation.to_string()))
        .collect()
}

/// Which published generation `snapshot` is, if it is one of them.
fn identify(snapshot: &Snapshot) -> Option<usize> {
    if snapshot.is_empty() {
        return Some(0);
    }
    let value: usize = snapshot.get("Sensor0")?.parse().ok()?;
    ((1..=PUBLISHES).contains(&value) && *snapshot == generation(value)).then_some(value)
}

#[test]
fn test_readers_never_observe_torn_snapshots() {
    let store = SnapshotStore::new();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let reader = store.reader();
                let done = &done;
                scope.spawn(move || {
                    let mut last = 0;
                    let mut observed = 0usize;
                    loop {
                        let finished = done.load(Ordering::Acquire);
                        let snapshot = reader.read();
                        let current = identify(&snapshot)
                            .unwrap_or_else(|| panic!("torn snapshot: {snapshot:?}"));
                        assert!(current >= last, "went back from {last} to {current}");
                        last = current;
                        observed += 1;
                        if finished {
                            assert_eq!(current, PUBLISHES);
                            return observed;
                        }
                    }
                })
            })
            .collect();

        for n in 1..=PUBLISHES {
            store.publish(generation(n));
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    });

    assert_eq!(*store.read(), generation(PUBLISHES));
}

#[test]
fn test_read_between_publishes_returns_exactly_last() {
    let store = SnapshotStore::new();
    let reader = store.reader();

    assert_eq!(*reader.read(), Snapshot::empty());
    for n in 1..=10 {
        store.publish(generation(n));
        assert_eq!(*reader.read(), generation(n));
    }
}
