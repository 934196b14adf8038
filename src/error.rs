//! Error types for the pipeline runtime.
//!
//! Every fallible public operation returns a [`PipelineError`]. The same
//! outcome is also mirrored into the thread-local slot read by
//! [`crate::errno::errno`], for call sites that prefer to check status after
//! the fact rather than match on a `Result`.

use thiserror::Error;

/// Failure modes a pipeline operation can report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    /// Allocation failed while growing a pool, FIFO, or the pipe/stage vectors.
    #[error("out of memory")]
    NoMem,
    /// The operation requires the pipeline to be stopped, but it is active.
    #[error("pipeline is active")]
    Active,
    /// The operation requires the pipeline to be disabled, but it is enabled.
    #[error("pipeline is enabled")]
    Enabled,
    /// The operation requires the pipeline to be enabled, but it is not.
    #[error("pipeline is not enabled")]
    NotEnabled,
    /// A required pointer/handle (pipeline, pipe, stage index) was invalid.
    #[error("invalid handle")]
    BadPtr,
    /// Spawning or joining an OS thread failed.
    #[error("thread error")]
    ThrdError,
    /// A mutex was poisoned by a panicking holder.
    #[error("mutex error")]
    MtxError,
    /// A condition variable wait failed.
    #[error("condition variable error")]
    CndError,
}

/// C-style status code mirroring [`PipelineError`], including a success value.
///
/// Stored in the thread-local slot that [`crate::errno::errno`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    /// No error.
    #[default]
    Ok,
    /// See [`PipelineError::NoMem`].
    NoMem,
    /// See [`PipelineError::Active`].
    Active,
    /// See [`PipelineError::Enabled`].
    Enabled,
    /// See [`PipelineError::NotEnabled`].
    NotEnabled,
    /// See [`PipelineError::BadPtr`].
    BadPtr,
    /// See [`PipelineError::ThrdError`].
    ThrdError,
    /// See [`PipelineError::MtxError`].
    MtxError,
    /// See [`PipelineError::CndError`].
    CndError,
}

impl ErrorCode {
    /// Human-readable description, equivalent to the original library's `strerror`.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "no error",
            Self::NoMem => "out of memory",
            Self::Active => "pipeline is active",
            Self::Enabled => "pipeline is enabled",
            Self::NotEnabled => "pipeline is not enabled",
            Self::BadPtr => "invalid handle",
            Self::ThrdError => "thread error",
            Self::MtxError => "mutex error",
            Self::CndError => "condition variable error",
        }
    }
}

impl From<PipelineError> for ErrorCode {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoMem => Self::NoMem,
            PipelineError::Active => Self::Active,
            PipelineError::Enabled => Self::Enabled,
            PipelineError::NotEnabled => Self::NotEnabled,
            PipelineError::BadPtr => Self::BadPtr,
            PipelineError::ThrdError => Self::ThrdError,
            PipelineError::MtxError => Self::MtxError,
            PipelineError::CndError => Self::CndError,
        }
    }
}
