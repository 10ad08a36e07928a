//! Store statistics.
//!
//! Counters are bumped by the store as it mutates; they can be read at any
//! time, including while other threads are writing.
//!
//! ```rust,ignore
//! let store = EntityStore::<u64>::new(schema);
//! store.put(0, alice)?;
//!
//! let stats = store.stats().snapshot();
//! println!("puts: {}", stats.puts);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Logical puts that inserted a new identity.
    puts: AtomicU64,
    /// Logical puts that replaced an existing occupant.
    updates: AtomicU64,
    /// Logical removes that found an entity.
    removes: AtomicU64,
    /// Primary and secondary lookups.
    lookups: AtomicU64,
    /// Association links cut by the decoupler.
    links_removed: AtomicU64,
    /// Entities removed by composite cascade.
    cascade_removals: AtomicU64,
    /// Identifiers handed out by the store's generator.
    identifiers_issued: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self, replaced: bool) {
        if replaced {
            self.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.puts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_links_removed(&self, count: u64) {
        self.links_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_cascade(&self) {
        self.cascade_removals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_identifier(&self) {
        self.identifiers_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of puts that inserted a new identity.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Returns the number of puts that replaced an occupant.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the number of removes that found an entity.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns the number of association links cut while decoupling.
    pub fn links_removed(&self) -> u64 {
        self.links_removed.load(Ordering::Relaxed)
    }

    /// Returns the number of cascaded composite removals.
    pub fn cascade_removals(&self) -> u64 {
        self.cascade_removals.load(Ordering::Relaxed)
    }

    /// Returns the number of identifiers issued.
    pub fn identifiers_issued(&self) -> u64 {
        self.identifiers_issued.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.puts(),
            updates: self.updates(),
            removes: self.removes(),
            lookups: self.lookups(),
            links_removed: self.links_removed(),
            cascade_removals: self.cascade_removals(),
            identifiers_issued: self.identifiers_issued(),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Puts that inserted a new identity.
    pub puts: u64,
    /// Puts that replaced an occupant.
    pub updates: u64,
    /// Removes that found an entity.
    pub removes: u64,
    /// Lookups.
    pub lookups: u64,
    /// Association links cut while decoupling.
    pub links_removed: u64,
    /// Cascaded composite removals.
    pub cascade_removals: u64,
    /// Identifiers issued.
    pub identifiers_issued: u64,
}
