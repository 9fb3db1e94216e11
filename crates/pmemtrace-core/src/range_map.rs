//! Ordered container of disjoint address ranges.
//!
//! [`RangeMap`] is the shared engine under both region registries and the
//! store-record set. Entries are keyed by start address in a balanced
//! ordered map; because stored ranges are pairwise disjoint, their end
//! addresses are ordered too, and a single predecessor probe answers any
//! overlap query in O(log n).
//!
//! The container itself never merges or splits. Callers that need
//! merge-on-insert or split-on-remove (the interval set, the flush
//! splitter) drive the `take_*` extraction primitives in a loop:
//! extract an overlapping entry, transform it, reinsert the survivors,
//! repeat until nothing overlaps.

use std::collections::BTreeMap;

use pmemtrace_types::MemoryRange;

struct Entry<V> {
    end: u64,
    value: V,
}

/// Disjoint ranges, each carrying a value.
pub struct RangeMap<V> {
    entries: BTreeMap<u64, Entry<V>>,
}

impl<V> RangeMap<V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Number of stored ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no ranges are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a range. The caller must have cleared any overlap first;
    /// stored ranges stay pairwise disjoint.
    pub fn insert(&mut self, range: MemoryRange, value: V) {
        debug_assert!(!range.is_empty(), "empty ranges are never stored");
        debug_assert!(
            self.find_overlapping(&range).is_none(),
            "insert would violate the disjointness invariant"
        );
        self.entries.insert(
            range.start(),
            Entry {
                end: range.end(),
                value,
            },
        );
    }

    /// Hot-path membership probe: does any stored range share a byte with
    /// `range`?
    ///
    /// This gates every traced store, and the common case is a miss.
    #[inline]
    #[must_use]
    pub fn contains_any(&self, range: &MemoryRange) -> bool {
        if range.is_empty() {
            return false;
        }
        match self.entries.range(..range.end()).next_back() {
            Some((_, entry)) => entry.end > range.start(),
            None => false,
        }
    }

    /// The stored range overlapping `range` with the greatest start, if
    /// any, together with its value.
    #[must_use]
    pub fn find_overlapping(&self, range: &MemoryRange) -> Option<(MemoryRange, &V)> {
        if range.is_empty() {
            return None;
        }
        let (&start, entry) = self.entries.range(..range.end()).next_back()?;
        (entry.end > range.start()).then(|| (MemoryRange::new(start, entry.end - start), &entry.value))
    }

    /// Remove and return one entry overlapping `range`, or `None` when no
    /// entry overlaps. Extraction loops call this until it misses.
    pub fn take_overlapping(&mut self, range: &MemoryRange) -> Option<(MemoryRange, V)> {
        let (found, _) = self.find_overlapping(range)?;
        self.remove_at(found.start())
    }

    /// Remove and return one entry overlapping **or adjacent to** `range`.
    ///
    /// The adjacency case is what lets region registration glue touching
    /// regions together.
    pub fn take_touching(&mut self, range: &MemoryRange) -> Option<(MemoryRange, V)> {
        // Inclusive bound: an entry starting exactly at `range.end()` touches.
        let (&start, entry) = self.entries.range(..=range.end()).next_back()?;
        if entry.end < range.start() {
            return None;
        }
        self.remove_at(start)
    }

    fn remove_at(&mut self, start: u64) -> Option<(MemoryRange, V)> {
        let entry = self.entries.remove(&start)?;
        Some((MemoryRange::new(start, entry.end - start), entry.value))
    }

    /// Visit every entry in address order.
    pub fn iter(&self) -> impl Iterator<Item = (MemoryRange, &V)> {
        self.entries
            .iter()
            .map(|(&start, entry)| (MemoryRange::new(start, entry.end - start), &entry.value))
    }

    /// Mutably visit every value in address order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|entry| &mut entry.value)
    }

    /// Keep only the entries for which `keep` returns true, allowing the
    /// value to be mutated along the way. Used by the fence sweep, which
    /// promotes and removes records in one pass.
    pub fn retain(&mut self, mut keep: impl FnMut(MemoryRange, &mut V) -> bool) {
        self.entries.retain(|&start, entry| {
            keep(MemoryRange::new(start, entry.end - start), &mut entry.value)
        });
    }

    /// Drain the map in address order.
    pub fn into_entries(self) -> impl Iterator<Item = (MemoryRange, V)> {
        self.entries
            .into_iter()
            .map(|(start, entry)| (MemoryRange::new(start, entry.end - start), entry.value))
    }
}

impl<V> Default for RangeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
