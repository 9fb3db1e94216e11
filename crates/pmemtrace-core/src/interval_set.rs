//! Merge-on-insert / split-on-remove interval set.
//!
//! [`IntervalSet`] keeps a canonical set of disjoint, non-adjacent address
//! ranges. Inserting a range glues it together with every overlapping or
//! touching neighbor; removing a range trims or splits whatever it cuts
//! through. The final set depends only on which spans were inserted and
//! removed, never on their order — region registration is commutative.

use pmemtrace_types::{MemoryRange, RegionClass};

use crate::range_map::RangeMap;

/// Canonical set of disjoint address ranges.
#[derive(Default)]
pub struct IntervalSet {
    spans: RangeMap<()>,
}

impl IntervalSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a range, merging it with every overlapping or adjacent span.
    pub fn insert(&mut self, range: MemoryRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        while let Some((neighbor, ())) = self.spans.take_touching(&merged) {
            merged = merged.union_span(&neighbor);
        }
        self.spans.insert(merged, ());
    }

    /// Remove a range. Spans fully inside it disappear; spans it cuts
    /// through are shrunk from the head or tail; a span strictly containing
    /// it splits in two.
    pub fn remove(&mut self, range: MemoryRange) {
        if range.is_empty() {
            return;
        }
        while let Some((hit, ())) = self.spans.take_overlapping(&range) {
            if hit.start() < range.start() {
                self.spans
                    .insert(MemoryRange::new(hit.start(), range.start() - hit.start()), ());
            }
            if range.end() < hit.end() {
                self.spans
                    .insert(MemoryRange::new(range.end(), hit.end() - range.end()), ());
            }
        }
    }

    /// Classify `range` against the set.
    ///
    /// When the query overlaps a span without being covered by it, the
    /// low/high edge is judged against that one span.
    #[must_use]
    pub fn classify(&self, range: &MemoryRange) -> RegionClass {
        let Some((found, _)) = self.spans.find_overlapping(range) else {
            return RegionClass::Absent;
        };
        if range.start() < found.start() {
            RegionClass::OverlapsLow
        } else if range.end() > found.end() {
            RegionClass::OverlapsHigh
        } else {
            RegionClass::Full
        }
    }

    /// Whether any span shares a byte with `range`.
    #[inline]
    #[must_use]
    pub fn contains_any(&self, range: &MemoryRange) -> bool {
        self.spans.contains_any(range)
    }

    /// Number of disjoint spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the set holds no spans.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Visit every span in address order.
    pub fn iter(&self) -> impl Iterator<Item = MemoryRange> + '_ {
        self.spans.iter().map(|(range, ())| range)
    }
}
