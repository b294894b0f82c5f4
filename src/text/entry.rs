//! Piece-table entries and display-position resolution

use smallvec::SmallVec;

/// One contiguous reference into the shared note buffer
///
/// `display_length` counts codepoints (what a cursor sees), `byte_length`
/// counts UTF-8 bytes in the buffer. The two are equal exactly when the
/// referenced fragment is pure ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    /// Byte offset into the note buffer
    pub start_index: usize,
    /// Number of codepoints the piece contributes to its line
    pub display_length: usize,
    /// Number of buffer bytes the piece covers
    pub byte_length: usize,
}

impl Piece {
    /// True if the referenced fragment contains no multibyte codepoint
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.display_length == self.byte_length
    }

    /// Byte offset of the `k`-th codepoint boundary within this piece
    ///
    /// `text` must be the exact buffer substring this piece references;
    /// `k` may equal `display_length` (the end boundary).
    pub(crate) fn byte_offset_of(&self, text: &str, k: usize) -> usize {
        debug_assert!(k <= self.display_length);
        debug_assert_eq!(text.len(), self.byte_length);

        if self.is_ascii() {
            return k;
        }

        text.char_indices()
            .nth(k)
            .map_or(text.len(), |(offset, _)| offset)
    }
}

/// The pieces of one logical line, in display order
///
/// Inline capacity of two: coalesced typing keeps most lines at a single
/// piece.
pub(crate) type TableLine = SmallVec<[Piece; 2]>;

/// Locate the piece containing display position `pos` on a line
///
/// Returns the piece index and the position within that piece, or `None`
/// when `pos` is at or beyond the end of the line.
pub(crate) fn entry_index_within_line(line: &TableLine, pos: usize) -> Option<(usize, usize)> {
    let mut accumulated = 0usize;
    for (i, piece) in line.iter().enumerate() {
        if pos < accumulated + piece.display_length {
            return Some((i, pos - accumulated));
        }
        accumulated += piece.display_length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn piece(start: usize, display: usize, byte: usize) -> Piece {
        Piece {
            start_index: start,
            display_length: display,
            byte_length: byte,
        }
    }

    #[test]
    fn test_is_ascii() {
        assert!(piece(0, 3, 3).is_ascii());
        assert!(!piece(0, 3, 5).is_ascii());
    }

    #[test]
    fn test_byte_offset_ascii_fast_path() {
        let p = piece(0, 5, 5);
        assert_eq!(p.byte_offset_of("hello", 0), 0);
        assert_eq!(p.byte_offset_of("hello", 3), 3);
        assert_eq!(p.byte_offset_of("hello", 5), 5);
    }

    #[test]
    fn test_byte_offset_multibyte() {
        // h(1) é(2) l(1) l(1) o(1) = 5 codepoints, 6 bytes
        let p = piece(0, 5, 6);
        assert_eq!(p.byte_offset_of("héllo", 1), 1);
        assert_eq!(p.byte_offset_of("héllo", 2), 3);
        assert_eq!(p.byte_offset_of("héllo", 5), 6);
    }

    #[test]
    fn test_entry_index_within_line() {
        let line: TableLine = smallvec![piece(0, 3, 3), piece(10, 2, 4)];
        assert_eq!(entry_index_within_line(&line, 0), Some((0, 0)));
        assert_eq!(entry_index_within_line(&line, 2), Some((0, 2)));
        assert_eq!(entry_index_within_line(&line, 3), Some((1, 0)));
        assert_eq!(entry_index_within_line(&line, 4), Some((1, 1)));
        assert_eq!(entry_index_within_line(&line, 5), None);
    }

    #[test]
    fn test_entry_index_empty_line() {
        let line = TableLine::new();
        assert_eq!(entry_index_within_line(&line, 0), None);
    }
}
