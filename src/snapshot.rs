//! Latest-value handoff between the acquisition loop and HTTP readers.
//!
//! A [`Snapshot`] is an immutable map of sensor key to literal value built
//! once per polling cycle. The [`SnapshotStore`] holds the current one in an
//! [`ArcSwap`]: publishing atomically swaps the pointer and reading loads it
//! without taking a lock, so a reader either sees the previous snapshot or
//! the next one, never a mix of both.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// One decoded sensor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    key: String,
    value: String,
}

impl Reading {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Sensor identifier, e.g. `EngineRPM`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Literal textual value as reported by the decoder.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// All sensor values known as of one acquisition cycle.
///
/// Keys iterate in sorted order. A missing key means the sensor is not
/// supported by the connected vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    readings: BTreeMap<String, String>,
}

impl Snapshot {
    /// The empty snapshot served before the first cycle and after failures.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.readings.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.readings
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl FromIterator<Reading> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        Self {
            readings: iter
                .into_iter()
                .map(|reading| (reading.key, reading.value))
                .collect(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(key, value)| Reading::new(key, value))
            .collect()
    }
}

/// State shared between the store and its readers.
#[derive(Debug)]
struct Shared {
    current: ArcSwap<Snapshot>,
    /// Publish counter, only used to wake subscribers.
    published: watch::Sender<u64>,
}

/// Single-writer holder of the current snapshot.
///
/// Not `Clone`: the owner is the only publisher. Readers get a
/// [`SnapshotReader`] via [`SnapshotStore::reader`].
#[derive(Debug)]
pub struct SnapshotStore {
    shared: Arc<Shared>,
}

impl SnapshotStore {
    /// Create a store whose current snapshot is empty.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                current: ArcSwap::from_pointee(Snapshot::empty()),
                published: watch::Sender::new(0),
            }),
        }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        self.shared.current.store(Arc::new(snapshot));
        self.shared.published.send_modify(|count| *count += 1);
    }

    /// Drop whatever is current and serve the empty snapshot instead.
    pub fn reset(&self) {
        self.publish(Snapshot::empty());
    }

    /// The most recently published snapshot.
    pub fn read(&self) -> Arc<Snapshot> {
        self.shared.current.load_full()
    }

    /// A cloneable read-only handle for concurrent consumers.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    shared: Arc<Shared>,
}

impl SnapshotReader {
    /// The most recently published snapshot. Lock-free, O(1), no copy of
    /// the readings.
    pub fn read(&self) -> Arc<Snapshot> {
        self.shared.current.load_full()
    }

    /// Subscribe to publish notifications. The value is the number of
    /// publishes so far; fetch the snapshot itself with [`read`](Self::read).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.published.subscribe()
    }
}
