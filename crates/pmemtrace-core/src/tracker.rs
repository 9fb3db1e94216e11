//! The store-tracking state machine.
//!
//! [`StoreTracker`] is the context object a host owns for one analysis
//! run. The instrumentation front end funnels every memory write into
//! [`StoreTracker::record_store`]; explicit program annotations drive
//! region registration and the flush/fence/commit transitions.
//!
//! The tracker is single-writer by contract: the host serializes all calls
//! (one mutex or one dispatch loop upstream), so no locking happens here.
//! Every operation completes synchronously — O(log n) for the region gate,
//! O(k log n) when k outstanding records are touched.

use std::mem;

use smallvec::SmallVec;
use tracing::{debug, warn};

use pmemtrace_error::{PmemError, Result};
use pmemtrace_types::{
    MemoryRange, Origin, RegionClass, StoreRecord, StoreState, TrackerConfig, TrackerStats,
};

use crate::diag::{BoundedLog, FlushErrorEvent, OverwriteEvent};
use crate::event::{FdPathResolver, NoFdResolver, NoOpSink, PmemEvent, StoreEventSink};
use crate::range_map::RangeMap;
use crate::regions::{LogRegionRegistry, RegionRegistry};
use crate::report::AnalysisReport;

/// Largest store width the instrumentation layer produces. Anything wider
/// is an unrecognized operation: warned about and skipped, never tracked.
pub const MAX_STORE_SIZE: u64 = 256;

/// Store tracker for one analysis run.
///
/// Owns all outstanding [`StoreRecord`] storage and the diagnostic logs.
/// After a fatal error ([`PmemError::OverwriteLogFull`]) the tracker must
/// be discarded; the accounting invariant is gone and no further call has
/// a defined meaning.
pub struct StoreTracker {
    config: TrackerConfig,
    regions: RegionRegistry,
    log_regions: LogRegionRegistry,
    stores: RangeMap<StoreRecord>,
    overwrites: BoundedLog<OverwriteEvent>,
    flush_errors: BoundedLog<FlushErrorEvent>,
    /// Logical clock, advanced once per translated unit of program
    /// progress by the host.
    epoch: u64,
    /// Runtime toggle layered under `config.enable_store_log`.
    logging_on: bool,
    sink: Box<dyn StoreEventSink>,
    resolver: Box<dyn FdPathResolver>,
}

impl StoreTracker {
    /// Create a tracker with no event stream and no fd resolution.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Self::with_collaborators(config, Box::new(NoOpSink), Box::new(NoFdResolver))
    }

    /// Create a tracker wired to a host event sink and fd-path resolver.
    ///
    /// Emits the `START` stream marker when store logging is enabled.
    pub fn with_collaborators(
        config: TrackerConfig,
        sink: Box<dyn StoreEventSink>,
        resolver: Box<dyn FdPathResolver>,
    ) -> Result<Self> {
        if !config.cache_line_size.is_power_of_two() {
            return Err(PmemError::InvalidCacheLineSize {
                size: config.cache_line_size,
            });
        }
        let mut tracker = Self {
            overwrites: BoundedLog::new(config.overwrite_log_capacity),
            flush_errors: BoundedLog::new(config.flush_error_log_capacity),
            config,
            regions: RegionRegistry::new(),
            log_regions: LogRegionRegistry::new(),
            stores: RangeMap::new(),
            epoch: 0,
            logging_on: false,
            sink,
            resolver,
        };
        if tracker.config.enable_store_log {
            tracker.sink.emit(&PmemEvent::Start)?;
        }
        Ok(tracker)
    }

    // -----------------------------------------------------------------
    // Region registration
    // -----------------------------------------------------------------

    /// Declare `[addr, addr + size)` as persistent memory.
    pub fn register_region(&mut self, addr: u64, size: u64) {
        self.regions.register(MemoryRange::new(addr, size));
    }

    /// Withdraw `[addr, addr + size)` from the persistent set.
    pub fn unregister_region(&mut self, addr: u64, size: u64) {
        self.regions.unregister(MemoryRange::new(addr, size));
    }

    /// Classify a range against the registered persistent regions.
    #[must_use]
    pub fn classify_region(&self, addr: u64, size: u64) -> RegionClass {
        self.regions.classify(&MemoryRange::new(addr, size))
    }

    /// Registered persistent regions in address order.
    pub fn persistent_regions(&self) -> impl Iterator<Item = MemoryRange> + '_ {
        self.regions.iter()
    }

    /// Register a persistent file mapping, for offline attribution only —
    /// tracking is unaffected.
    ///
    /// Fails on a negative descriptor or when the host resolver cannot
    /// name it. The `REGISTER_FILE` event ignores the runtime logging
    /// toggle: offline analyzers need the mapping even when store logging
    /// is paused.
    pub fn register_file_mapping(
        &mut self,
        fd: i32,
        addr: u64,
        size: u64,
        offset: u64,
    ) -> Result<()> {
        if fd < 0 {
            return Err(PmemError::BadFileDescriptor { fd });
        }
        let path = self
            .resolver
            .resolve(fd)
            .ok_or(PmemError::UnresolvedFdPath { fd })?;
        debug!(fd, path = %path.display(), addr, size, "registered persistent file mapping");
        if self.config.enable_store_log {
            self.sink.emit(&PmemEvent::RegisterFile {
                path,
                addr,
                size,
                offset,
            })?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Log regions and runtime toggles
    // -----------------------------------------------------------------

    /// Select `[addr, addr + size)` for fine-grained store logging.
    pub fn add_log_region(&mut self, addr: u64, size: u64) {
        self.log_regions.add(MemoryRange::new(addr, size));
    }

    /// Deselect `[addr, addr + size)` from store logging.
    pub fn remove_log_region(&mut self, addr: u64, size: u64) {
        self.log_regions.remove(MemoryRange::new(addr, size));
    }

    /// Turn the runtime logging toggle on.
    pub fn enable_logging(&mut self) {
        self.logging_on = true;
    }

    /// Turn the runtime logging toggle off. Log regions keep logging.
    pub fn disable_logging(&mut self) {
        self.logging_on = false;
    }

    /// Advance the logical clock by one unit of program progress.
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Current logical clock value.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // -----------------------------------------------------------------
    // The state machine
    // -----------------------------------------------------------------

    /// Record a store of `value` to `[addr, addr + size)`.
    ///
    /// Stores outside registered persistent memory are ignored — that is
    /// the dominant case and costs one ordered-map probe. A store
    /// overwriting outstanding records displaces them; with multiple-store
    /// tracking enabled each displaced record is snapshotted to the
    /// overwrite log unless it falls inside the indifference window.
    pub fn record_store(&mut self, addr: u64, size: u64, value: u64, origin: Origin) -> Result<()> {
        let range = MemoryRange::new(addr, size);
        if !self.regions.contains_any(&range) {
            return Ok(());
        }
        // An empty store never reaches this point: the region gate already
        // rejected it.
        if size > MAX_STORE_SIZE {
            warn!(addr, size, "unsupported store width, store not tracked");
            return Ok(());
        }

        // The store is logged even when it turns out to displace another.
        if self.store_event_enabled(&range) {
            self.sink.emit(&PmemEvent::Store { addr, value, size })?;
        }

        let mut displaced: SmallVec<[StoreRecord; 2]> = SmallVec::new();
        while let Some((_, old)) = self.stores.take_overlapping(&range) {
            displaced.push(old);
        }
        for old in displaced {
            if !self.config.track_multiple_stores {
                continue;
            }
            // A recent identical write to the identical range is benign
            // (compiler-emitted redundant store), not an overwrite.
            if self.epoch - old.epoch < self.config.indifference_window
                && old.range == range
                && old.value == value
            {
                continue;
            }
            if !self.overwrites.try_push(OverwriteEvent { store: old }) {
                return Err(PmemError::OverwriteLogFull {
                    capacity: self.overwrites.capacity(),
                });
            }
        }

        self.stores.insert(
            range,
            StoreRecord {
                range,
                value,
                epoch: self.epoch,
                origin,
                state: StoreState::Dirty,
            },
        );
        Ok(())
    }

    /// Register a flush of `[addr, addr + size)`.
    ///
    /// The range is widened outward to cache-line boundaries first. Dirty
    /// records it touches become `Flushed`; portions of a record outside
    /// the widened range split off as fresh `Dirty` records keeping the
    /// original value, epoch and origin. Flushing a record that is not
    /// `Dirty` is a duplicate flush: recorded when
    /// `check_duplicate_flush` is set, and the record is left unchanged.
    pub fn flush(&mut self, addr: u64, size: u64) -> Result<()> {
        let aligned = MemoryRange::new(addr, size).align_outward(self.config.cache_line_size);
        if self.protocol_event_enabled() {
            self.sink.emit(&PmemEvent::Flush {
                addr: aligned.start(),
                size: aligned.size(),
            })?;
        }

        let mut touched: SmallVec<[StoreRecord; 4]> = SmallVec::new();
        while let Some((_, record)) = self.stores.take_overlapping(&aligned) {
            touched.push(record);
        }
        for mut record in touched {
            if record.state != StoreState::Dirty {
                if self.config.check_duplicate_flush {
                    self.flush_errors.push_lossy(FlushErrorEvent {
                        store: record.clone(),
                    });
                }
                self.stores.insert(record.range, record);
                continue;
            }

            let Some(covered) = record.range.intersect(&aligned) else {
                // take_overlapping only yields intersecting records.
                self.stores.insert(record.range, record);
                continue;
            };
            if record.range.start() < covered.start() {
                let head = MemoryRange::new(
                    record.range.start(),
                    covered.start() - record.range.start(),
                );
                self.stores.insert(
                    head,
                    StoreRecord {
                        range: head,
                        ..record.clone()
                    },
                );
            }
            if covered.end() < record.range.end() {
                let tail = MemoryRange::new(covered.end(), record.range.end() - covered.end());
                self.stores.insert(
                    tail,
                    StoreRecord {
                        range: tail,
                        ..record.clone()
                    },
                );
            }
            record.range = covered;
            record.state = StoreState::Flushed;
            self.stores.insert(covered, record);
        }
        Ok(())
    }

    /// Register an ordering fence.
    ///
    /// `Flushed` records become `Fenced`; `Committed` records are now
    /// durable and leave the tracker. `Dirty` and `Fenced` records are
    /// untouched.
    pub fn fence(&mut self) -> Result<()> {
        if self.protocol_event_enabled() {
            self.sink.emit(&PmemEvent::Fence)?;
        }
        self.stores.retain(|_, record| match record.state {
            StoreState::Flushed => {
                record.state = StoreState::Fenced;
                true
            }
            StoreState::Committed => false,
            StoreState::Dirty | StoreState::Fenced => true,
        });
        Ok(())
    }

    /// Register a protocol-level commit.
    ///
    /// `Fenced` records become `Committed`. A commit with no later fence
    /// leaves them outstanding — committing without fencing is exactly the
    /// bug class this tool reports.
    pub fn commit(&mut self) -> Result<()> {
        if self.protocol_event_enabled() {
            self.sink.emit(&PmemEvent::Commit)?;
        }
        for record in self.stores.values_mut() {
            if record.state == StoreState::Fenced {
                record.state = StoreState::Committed;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reorder/fault simulation markers
    // -----------------------------------------------------------------

    /// Mark the start of a full-reorder simulation section on the stream.
    pub fn mark_full_reorder(&mut self) -> Result<()> {
        self.emit_marker(PmemEvent::FullReorder)
    }

    /// Mark the start of a partial-reorder simulation section.
    pub fn mark_partial_reorder(&mut self) -> Result<()> {
        self.emit_marker(PmemEvent::PartialReorder)
    }

    /// Mark the start of a fault-only simulation section.
    pub fn mark_only_fault(&mut self) -> Result<()> {
        self.emit_marker(PmemEvent::OnlyFault)
    }

    /// Mark the end of a reorder/fault simulation section.
    pub fn mark_stop_reorder_fault(&mut self) -> Result<()> {
        self.emit_marker(PmemEvent::StopReorderFault)
    }

    fn emit_marker(&mut self, event: PmemEvent) -> Result<()> {
        if self.protocol_event_enabled() {
            self.sink.emit(&event)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Introspection and finalization
    // -----------------------------------------------------------------

    /// Point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            outstanding_count: self.stores.len(),
            outstanding_bytes: self.stores.iter().map(|(range, _)| range.size()).sum(),
            overwrite_count: self.overwrites.len(),
            flush_error_count: self.flush_errors.len(),
        }
    }

    /// Finish the analysis.
    ///
    /// Every record still outstanding — whatever its state — is a
    /// non-durable-store finding. Emits the `|STOP` stream marker when
    /// store logging is enabled and folds the diagnostic logs into the
    /// returned report.
    pub fn finish(mut self) -> Result<AnalysisReport> {
        if self.config.enable_store_log {
            self.sink.emit(&PmemEvent::Stop)?;
        }
        let outstanding: Vec<StoreRecord> = mem::take(&mut self.stores)
            .into_entries()
            .map(|(_, record)| record)
            .collect();
        let (overwrites, _) = mem::replace(&mut self.overwrites, BoundedLog::new(0)).into_parts();
        let (flush_errors, flush_errors_dropped) =
            mem::replace(&mut self.flush_errors, BoundedLog::new(0)).into_parts();
        Ok(AnalysisReport {
            outstanding,
            overwrites,
            flush_errors,
            flush_errors_dropped,
            regions: self.regions.iter().collect(),
            summary_enabled: self.config.print_summary,
        })
    }

    // -----------------------------------------------------------------
    // Event gating
    // -----------------------------------------------------------------

    /// Store events: the runtime toggle, or containment in a log region.
    fn store_event_enabled(&self, range: &MemoryRange) -> bool {
        self.config.enable_store_log && (self.logging_on || self.log_regions.covers(range))
    }

    /// Protocol events (flush/fence/commit, reorder markers): the runtime
    /// toggle, or any log region being selected at all.
    fn protocol_event_enabled(&self) -> bool {
        self.config.enable_store_log && (self.logging_on || !self.log_regions.is_empty())
    }
}
