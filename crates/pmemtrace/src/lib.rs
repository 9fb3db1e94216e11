//! Public API facade for pmemtrace.
//!
//! pmemtrace verifies correct use of persistent-memory durability
//! protocols: for every byte an analyzed program writes into memory it
//! declared persistent, the tracker decides whether that byte was made
//! durable through a proper flush → fence → commit sequence before exit,
//! and flags overwritten-but-not-durable stores and duplicate flushes.
//!
//! ```
//! use pmemtrace::{Origin, StoreTracker, TrackerConfig};
//!
//! let mut tracker = StoreTracker::new(TrackerConfig::default())?;
//! tracker.register_region(0x1000, 0x100);
//!
//! tracker.record_store(0x1000, 8, 0xAA, Origin::new("pool.c:42"))?;
//! tracker.flush(0x1000, 64)?;
//! tracker.fence()?;
//! tracker.commit()?;
//! tracker.fence()?;
//!
//! let report = tracker.finish()?;
//! assert!(report.is_clean());
//! # Ok::<(), pmemtrace::PmemError>(())
//! ```

pub use pmemtrace_core::{
    AnalysisReport, FdPathResolver, FlushErrorEvent, NoFdResolver, NoOpSink, OverwriteEvent,
    PmemEvent, StoreEventSink, StoreTracker, WriterSink, MAX_STORE_SIZE,
};
pub use pmemtrace_error::{PmemError, Result};
pub use pmemtrace_types::{
    MemoryRange, Origin, RegionClass, StoreRecord, StoreState, TrackerConfig, TrackerStats,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_surface_round_trip() {
        let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
        tracker.register_region(0x1000, 0x100);
        assert_eq!(tracker.classify_region(0x1000, 0x10), RegionClass::Full);

        tracker
            .record_store(0x1000, 8, 0xAA, Origin::unknown())
            .unwrap();
        assert_eq!(tracker.stats().outstanding_count, 1);

        let report = tracker.finish().unwrap();
        assert_eq!(report.outstanding.len(), 1);
        assert!(report.summary_enabled);
    }
}
