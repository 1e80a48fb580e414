//! Error types for crosswire.

use std::fmt;

/// The main error type for crosswire operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrosswireError {
    /// Event-loop-related error.
    Loop(LoopError),
    /// Timer-related error.
    Timer(TimerError),
}

impl fmt::Display for CrosswireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loop(err) => write!(f, "event loop error: {err}"),
            Self::Timer(err) => write!(f, "timer error: {err}"),
        }
    }
}

impl std::error::Error for CrosswireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Loop(err) => Some(err),
            Self::Timer(err) => Some(err),
        }
    }
}

/// Event-loop-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// The loop has quit (or quit while the operation was in flight).
    Terminated,
    /// The operation is only valid on the loop's owning thread.
    WrongThread,
    /// `run` was called while the loop is already running.
    AlreadyRunning,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => write!(f, "the event loop has terminated"),
            Self::WrongThread => {
                write!(f, "operation must be performed on the loop's owning thread")
            }
            Self::AlreadyRunning => write!(f, "the event loop is already running"),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<LoopError> for CrosswireError {
    fn from(err: LoopError) -> Self {
        Self::Loop(err)
    }
}

/// Timer-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// No event loop is registered for the calling thread.
    NoEventLoop,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEventLoop => write!(f, "no event loop registered for the calling thread"),
        }
    }
}

impl std::error::Error for TimerError {}

impl From<TimerError> for CrosswireError {
    fn from(err: TimerError) -> Self {
        Self::Timer(err)
    }
}

/// A specialized Result type for crosswire operations.
pub type Result<T> = std::result::Result<T, CrosswireError>;
