//! Fernote core - the piece-table text engine behind a tree of notes
//!
//! One [`text::NoteText`] holds the body of a single note as lines of
//! pieces pointing into a [`buffer::NoteBuffer`] shared by every note
//! loaded from the same tree. All editing goes through a reversible
//! command history that coalesces adjacent keystrokes into single undo
//! steps.

pub mod buffer;
pub mod character;
pub mod error;
pub mod text;
