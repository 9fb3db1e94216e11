//! Foundation types for pmemtrace.
//!
//! Everything here is plain data: address ranges, store records and their
//! durability states, the configuration surface, and the statistics
//! snapshot. The state machine that drives these types lives in
//! `pmemtrace-core`.

pub mod range;

pub use range::MemoryRange;

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Durability state of an outstanding store.
///
/// ```text
/// Dirty → Flushed → Fenced → Committed → (removed: durable)
/// ```
///
/// A clean record is never stored — reaching the post-commit fence removes
/// the record from the tracker entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StoreState {
    /// Written but not yet flushed toward persistent media.
    Dirty,
    /// Flushed, awaiting a fence to order the flush.
    Flushed,
    /// Fence observed after the flush; eligible for commit.
    Fenced,
    /// Committed under the program's protocol; one more fence makes it
    /// durable.
    Committed,
}

impl StoreState {
    /// Upper-case rendering used by the end-of-run summary.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dirty => "DIRTY",
            Self::Flushed => "FLUSHED",
            Self::Fenced => "FENCED",
            Self::Committed => "COMMITTED",
        }
    }
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque call-site token attached to every tracked store.
///
/// The host's unwinding machinery produces these (stack walking is a
/// platform collaborator, not part of the core); the checker only ever
/// clones and renders them. Cloning is cheap — the rendered text is
/// shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(Arc<str>);

impl Origin {
    /// Wrap a rendered call-site description.
    #[must_use]
    pub fn new(rendered: impl Into<Arc<str>>) -> Self {
        Self(rendered.into())
    }

    /// Placeholder origin for hosts that do not capture call sites.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("<unknown>")
    }

    /// The rendered call-site text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A single outstanding store to persistent memory.
///
/// Created `Dirty` on every tracked write, mutated only by the
/// flush/fence/commit transitions and by overlap resolution, and destroyed
/// either by reaching the post-commit fence or by being overwritten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreRecord {
    /// Bytes the store wrote.
    pub range: MemoryRange,
    /// Value written, zero-extended to a machine word.
    pub value: u64,
    /// Logical clock at the time of the store; used to judge recency of
    /// repeated writes against the indifference window.
    pub epoch: u64,
    /// Call site that issued the store.
    pub origin: Origin,
    /// Current durability state.
    pub state: StoreState,
}

/// Classification of a queried range against a region registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegionClass {
    /// No registered region overlaps the query.
    Absent,
    /// The query lies entirely within one registered region.
    Full,
    /// The query extends below the start of the region it overlaps.
    OverlapsLow,
    /// The query extends past the end of the region it overlaps.
    OverlapsHigh,
}

/// Configuration surface of the store tracker.
///
/// Every diagnostic beyond the end-of-run non-durable-store report is
/// opt-in by default.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Track overwrites of not-yet-durable stores. When off, an
    /// overwritten store is discarded silently and only the final store to
    /// an address is judged. Default `false`.
    pub track_multiple_stores: bool,
    /// Epoch distance under which an identical repeated write (same range,
    /// same value) is not reported as an overwrite. Default `0`.
    pub indifference_window: u64,
    /// Master switch for the structured event stream. Default `false`.
    pub enable_store_log: bool,
    /// Whether the host should render the end-of-run summary. Default
    /// `true`.
    pub print_summary: bool,
    /// Record flushes of already-flushed/fenced/committed ranges. Default
    /// `false`.
    pub check_duplicate_flush: bool,
    /// Cache line size used to widen flush ranges. Supplied by the host
    /// (auto-detection is a platform concern); must be a nonzero power of
    /// two. Default `64`.
    pub cache_line_size: u64,
    /// Hard capacity of the overwrite log; exceeding it is fatal. Default
    /// `10_000`.
    pub overwrite_log_capacity: usize,
    /// Capacity of the duplicate-flush log; entries past it are dropped
    /// silently. Default `10_000`.
    pub flush_error_log_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_multiple_stores: false,
            indifference_window: 0,
            enable_store_log: false,
            print_summary: true,
            check_duplicate_flush: false,
            cache_line_size: 64,
            overwrite_log_capacity: 10_000,
            flush_error_log_capacity: 10_000,
        }
    }
}

/// Point-in-time counters for host introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Outstanding (not yet durable) store records.
    pub outstanding_count: usize,
    /// Total bytes covered by outstanding records.
    pub outstanding_bytes: u64,
    /// Overwrite events captured so far.
    pub overwrite_count: usize,
    /// Duplicate-flush events captured so far.
    pub flush_error_count: usize,
}
