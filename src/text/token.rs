//! Keystroke-coalescing token
//!
//! Remembers the kind and cursor position of the last public edit. The
//! next edit coalesces into the top history command only when it is the
//! same kind, on the same line, at exactly the position the previous
//! edit left the cursor. Any other user action (cursor motion, focus
//! change, undo/redo) resets the token.

/// The kind of the last public edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditKind {
    Insertion,
    DeleteBefore,
    DeleteCurrent,
    LineBreak,
    LineJoin,
}

/// Coalescing state: what the previous edit was and where it ended
#[derive(Debug, Default)]
pub(crate) struct EditToken {
    last: Option<(EditKind, usize, usize)>,
}

impl EditToken {
    /// Does the pending edit continue the previous one?
    pub(crate) fn check(&self, kind: EditKind, line: usize, pos: usize) -> bool {
        self.last == Some((kind, line, pos))
    }

    /// Record the kind and post-edit cursor position of an edit
    pub(crate) fn acquire(&mut self, kind: EditKind, line: usize, pos: usize) {
        self.last = Some((kind, line, pos));
    }

    /// Forget the coalescing context
    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_matches_nothing() {
        let token = EditToken::default();
        assert!(!token.check(EditKind::Insertion, 0, 0));
    }

    #[test]
    fn test_acquire_then_check() {
        let mut token = EditToken::default();
        token.acquire(EditKind::Insertion, 2, 7);

        assert!(token.check(EditKind::Insertion, 2, 7));
        assert!(!token.check(EditKind::Insertion, 2, 6));
        assert!(!token.check(EditKind::Insertion, 1, 7));
        assert!(!token.check(EditKind::DeleteBefore, 2, 7));
    }

    #[test]
    fn test_reset_forgets() {
        let mut token = EditToken::default();
        token.acquire(EditKind::DeleteBefore, 0, 3);
        token.reset();
        assert!(!token.check(EditKind::DeleteBefore, 0, 3));
    }
}
