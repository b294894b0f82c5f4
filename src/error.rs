//! Centralized error handling for the text engine
//!
//! Only caller-recoverable failures are represented here. Internal
//! invariant violations (a history cursor past the end of the history, a
//! content command invoked with no buffer attached) panic instead; no
//! correct caller can reach them.

use thiserror::Error;

/// An error raised by [`crate::text::NoteText`] operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TextError {
    /// A piece referenced a different note buffer than the one the text
    /// is already attached to. Every piece of a text must come from the
    /// same buffer.
    #[error("piece references a different note buffer than the one already attached")]
    BufferMismatch,

    /// A line with pieces was read while no note buffer is attached.
    #[error("non-empty line has no attached note buffer")]
    MissingBuffer,
}
