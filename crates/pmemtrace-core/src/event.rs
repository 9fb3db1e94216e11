//! Structured trace-event stream.
//!
//! An external offline analyzer consumes one line per event, tag-prefixed
//! and semicolon-delimited. The wire format is fixed; [`PmemEvent`]'s
//! `Display` impl is its single source of truth.
//!
//! Emission goes through the [`StoreEventSink`] observer trait: opt-in,
//! no-op by default, and never allowed to block the store hot path on
//! anything but the actual write. Hosts that want the stream on disk hand
//! the tracker a [`WriterSink`]; tests hand it an in-memory collector.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;

/// One event on the structured trace stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PmemEvent {
    /// Stream opening marker, emitted once when store logging is enabled.
    Start,
    /// A store into tracked persistent memory.
    Store { addr: u64, value: u64, size: u64 },
    /// A flush, already widened to cache-line boundaries.
    Flush { addr: u64, size: u64 },
    /// An ordering fence.
    Fence,
    /// A protocol-level commit marker.
    Commit,
    /// A persistent file mapping, for offline address-to-file attribution.
    RegisterFile {
        path: PathBuf,
        addr: u64,
        size: u64,
        offset: u64,
    },
    /// The analyzed program requested full-reorder simulation downstream.
    FullReorder,
    /// The analyzed program requested partial-reorder simulation.
    PartialReorder,
    /// The analyzed program requested fault-only simulation.
    OnlyFault,
    /// The analyzed program ended a reorder/fault simulation section.
    StopReorderFault,
    /// Stream closing marker, emitted at finalize.
    Stop,
}

impl fmt::Display for PmemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Store { addr, value, size } => {
                write!(f, "|STORE;0x{addr:x};0x{value:x};0x{size:x}")
            }
            Self::Flush { addr, size } => write!(f, "|FLUSH;0x{addr:x};0x{size:x}"),
            Self::Fence => f.write_str("|FENCE"),
            Self::Commit => f.write_str("|COMMIT"),
            Self::RegisterFile {
                path,
                addr,
                size,
                offset,
            } => write!(
                f,
                "|REGISTER_FILE;{};0x{addr:x};0x{size:x};0x{offset:x}",
                path.display()
            ),
            Self::FullReorder => f.write_str("|FREORDER"),
            Self::PartialReorder => f.write_str("|PREORDER"),
            Self::OnlyFault => f.write_str("|FAULT_ONLY"),
            Self::StopReorderFault => f.write_str("|NO_REORDER_FAULT"),
            Self::Stop => f.write_str("|STOP"),
        }
    }
}

/// Consumer of the structured trace stream.
///
/// Implementations must not block beyond their own write and must not call
/// back into the tracker.
pub trait StoreEventSink {
    /// Deliver one event.
    fn emit(&mut self, event: &PmemEvent) -> io::Result<()>;
}

/// Sink that discards every event. The default when the host does not
/// attach a stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl StoreEventSink for NoOpSink {
    fn emit(&mut self, _event: &PmemEvent) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing one line per event to any [`Write`] target.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> StoreEventSink for WriterSink<W> {
    fn emit(&mut self, event: &PmemEvent) -> io::Result<()> {
        writeln!(self.writer, "{event}")
    }
}

/// Host-supplied file-descriptor-to-path resolution.
///
/// The platform mechanism behind it (`/proc/self/fd` readlink or
/// otherwise) is a collaborator outside the core; the tracker only needs
/// the answer for `REGISTER_FILE` attribution.
pub trait FdPathResolver {
    /// The path the descriptor refers to, or `None` when it cannot be
    /// resolved.
    fn resolve(&self, fd: i32) -> Option<PathBuf>;
}

/// Resolver that knows no descriptors. The default when the host does not
/// supply one; every file-mapping registration fails through it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFdResolver;

impl FdPathResolver for NoFdResolver {
    fn resolve(&self, _fd: i32) -> Option<PathBuf> {
        None
    }
}
