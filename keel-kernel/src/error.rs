//! Error type for the fallible core operations.
//!
//! Only application-level misuse is reported this way (stale handles,
//! operations in the wrong state, bad boot parameters). Kernel invariant
//! violations are not errors, they are corruption, and panic instead.

use core::fmt;

/// Reason a core operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The thread handle does not name a live thread.
    UnknownThread,
    /// The semaphore handle does not name a live semaphore.
    UnknownSemaphore,
    /// The mutex handle does not name a live mutex.
    UnknownMutex,
    /// The bell handle does not name a live bell.
    UnknownBell,
    /// The object exists but is in the wrong state for the operation.
    InvalidState,
    /// The platform reported a CPU count outside `1..=CPU_MAX`.
    CpuCountOutOfRange,
    /// This CPU was already initialised.
    AlreadyStarted,
    /// A system instance is already installed process-wide.
    AlreadyInstalled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Error::UnknownThread => "unknown thread handle",
            Error::UnknownSemaphore => "unknown semaphore handle",
            Error::UnknownMutex => "unknown mutex handle",
            Error::UnknownBell => "unknown bell handle",
            Error::InvalidState => "object is in the wrong state",
            Error::CpuCountOutOfRange => "cpu count out of range",
            Error::AlreadyStarted => "cpu already initialised",
            Error::AlreadyInstalled => "system already installed",
        };
        f.write_str(message)
    }
}
