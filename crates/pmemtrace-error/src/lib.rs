//! Error types for pmemtrace.
//!
//! One structured error enum for the whole workspace. Almost every anomaly
//! the checker finds is a *finding*, recorded in a diagnostic log and
//! reported at end of run — those never surface here. `PmemError` is
//! reserved for conditions under which the analysis itself cannot continue
//! or an operation could not be carried out.

use thiserror::Error;

/// Primary error type for pmemtrace operations.
#[derive(Error, Debug)]
pub enum PmemError {
    // === Tracking integrity ===
    /// The overwrite log reached its hard capacity.
    ///
    /// Past this point the one-event-per-overwrite accounting can no longer
    /// be trusted, so the analysis must terminate. This is the only fatal
    /// diagnostic condition.
    #[error(
        "the number of overwritten stores exceeded {capacity}; \
         this either means there is something fundamentally wrong with the \
         analyzed program, or it is using persistent memory as volatile memory"
    )]
    OverwriteLogFull { capacity: usize },

    // === Configuration ===
    /// The configured cache line size cannot be used for flush alignment.
    #[error("cache line size {size} is not a nonzero power of two")]
    InvalidCacheLineSize { size: u64 },

    // === File mapping registration ===
    /// A file mapping was registered with a negative file descriptor.
    #[error("invalid file descriptor: {fd}")]
    BadFileDescriptor { fd: i32 },

    /// The host resolver could not produce a path for the descriptor.
    #[error("no path could be resolved for file descriptor {fd}")]
    UnresolvedFdPath { fd: i32 },

    // === Event stream ===
    /// Writing to the structured event sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout pmemtrace.
pub type Result<T> = std::result::Result<T, PmemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_log_full_names_capacity() {
        let err = PmemError::OverwriteLogFull { capacity: 10_000 };
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into())
        }
        assert!(matches!(fails(), Err(PmemError::Io(_))));
    }
}
