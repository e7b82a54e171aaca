//! Error taxonomy shared across the engine. One variant per error *kind*,
//! not per call site — several operations in different modules return the
//! same variant.

use thiserror::Error;

/// A single error type shared by every subsystem in the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CwError {
    /// A value was out of range, or a representation was malformed.
    #[error("bad argument: {field} = {value}")]
    BadArgument { field: &'static str, value: String },

    /// Unknown character, or a representation with no matching character.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tone queue full, or above the high-water mark.
    #[error("would block: {0}")]
    WouldBlock(&'static str),

    /// Reserved for future cross-subsystem locking; currently unenforced.
    #[error("busy: {0}")]
    Busy(&'static str),

    /// Receive-path call made in an incompatible state.
    #[error("out of order: {0}")]
    OutOfOrder(&'static str),

    /// Classification not yet decidable; noise spike was discarded.
    #[error("try again")]
    TryAgain,

    /// Receive buffer is full.
    #[error("no memory: receive buffer exhausted")]
    NoMemory,

    /// Setting receive speed while adaptive tracking is enabled.
    #[error("not permitted: {0}")]
    NotPermitted(&'static str),

    /// Wait requested while the driving signal/event source is blocked.
    #[error("deadlock: {0}")]
    Deadlock(&'static str),

    /// Requested audio backend is not available in this build/host.
    #[error("no backend: {0}")]
    NoBackend(String),

    /// Audio device open or write failed.
    #[error("io error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, CwError>;
