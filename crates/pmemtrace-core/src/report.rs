//! End-of-run analysis report.
//!
//! [`AnalysisReport`] is plain data: the host decides whether to render
//! the human-readable summary (`Display`) or serialize the whole thing
//! for machine consumption.

use std::fmt;

use serde::Serialize;

use pmemtrace_types::{MemoryRange, StoreRecord};

use crate::diag::{FlushErrorEvent, OverwriteEvent};

/// Findings of one finished analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Stores never made durable, in address order. Any state counts: a
    /// record that missed only its final fence is still not durable.
    pub outstanding: Vec<StoreRecord>,
    /// Stores overwritten before becoming durable (opt-in).
    pub overwrites: Vec<OverwriteEvent>,
    /// Stores flushed more than once (opt-in).
    pub flush_errors: Vec<FlushErrorEvent>,
    /// Duplicate-flush events dropped past the log's capacity.
    pub flush_errors_dropped: u64,
    /// Persistent regions still registered at exit.
    pub regions: Vec<MemoryRange>,
    /// Whether the host asked for the summary to be rendered
    /// (`print_summary`).
    pub summary_enabled: bool,
}

impl AnalysisReport {
    /// Total bytes never made durable.
    #[must_use]
    pub fn outstanding_bytes(&self) -> u64 {
        self.outstanding.iter().map(|r| r.range.size()).sum()
    }

    /// Whether the run finished with no findings at all.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outstanding.is_empty()
            && self.overwrites.is_empty()
            && self.flush_errors.is_empty()
            && self.flush_errors_dropped == 0
    }
}

fn write_record(f: &mut fmt::Formatter<'_>, index: usize, record: &StoreRecord) -> fmt::Result {
    writeln!(f, "[{index}] {}", record.origin)?;
    writeln!(
        f,
        "\tAddress: 0x{:x}\tsize: {}\tstate: {}",
        record.range.start(),
        record.range.size(),
        record.state
    )
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Number of stores not made persistent: {}",
            self.outstanding.len()
        )?;
        if !self.outstanding.is_empty() {
            writeln!(f, "Stores not made persistent properly:")?;
            for (index, record) in self.outstanding.iter().enumerate() {
                write_record(f, index, record)?;
            }
            writeln!(
                f,
                "Total memory not made persistent: {}",
                self.outstanding_bytes()
            )?;
        }

        if !self.flush_errors.is_empty() || self.flush_errors_dropped > 0 {
            writeln!(
                f,
                "\nNumber of multiply flushed stores: {}",
                self.flush_errors.len()
            )?;
            writeln!(f, "Stores flushed multiple times:")?;
            for (index, event) in self.flush_errors.iter().enumerate() {
                write_record(f, index, &event.store)?;
            }
            if self.flush_errors_dropped > 0 {
                writeln!(
                    f,
                    "Duplicate flush events dropped past capacity: {}",
                    self.flush_errors_dropped
                )?;
            }
        }

        if !self.overwrites.is_empty() {
            writeln!(
                f,
                "\nNumber of overwritten stores: {}",
                self.overwrites.len()
            )?;
            writeln!(f, "Overwritten stores before they were made persistent:")?;
            for (index, event) in self.overwrites.iter().enumerate() {
                write_record(f, index, &event.store)?;
            }
        }
        Ok(())
    }
}
