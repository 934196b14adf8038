//! Thread-local last-error slot.
//!
//! Every public entry point records its outcome here in addition to
//! returning a `Result`, mirroring the original library's `errno`-style
//! status reporting.

use std::cell::Cell;

use crate::error::{ErrorCode, PipelineError};

thread_local! {
    static LAST_ERROR: Cell<ErrorCode> = const { Cell::new(ErrorCode::Ok) };
}

/// Returns the status of the most recent pipeline call made from this thread.
#[must_use]
pub fn errno() -> ErrorCode {
    LAST_ERROR.with(Cell::get)
}

pub(crate) fn set_ok() {
    LAST_ERROR.with(|slot| slot.set(ErrorCode::Ok));
}

pub(crate) fn set_err(err: PipelineError) {
    LAST_ERROR.with(|slot| slot.set(ErrorCode::from(err)));
}

/// Records `result` into the thread-local slot, then returns it unchanged.
pub(crate) fn record<T>(result: Result<T, PipelineError>) -> Result<T, PipelineError> {
    match &result {
        Ok(_) => set_ok(),
        Err(err) => set_err(*err),
    }
    result
}
