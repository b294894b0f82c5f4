//! Primitive piece-table mutators
//!
//! The low-level edits the command engine dispatches to. Each forward
//! primitive has an exact inverse. Preconditions are the command
//! engine's responsibility and are only `debug_assert`ed here.
//!
//! Canonicality (no two adjacent pieces on a line referencing contiguous
//! buffer ranges) can only be broken by removing a piece between two
//! others or by joining two lines; `delete_entry_and_merge` and
//! `join_lines` therefore fuse actively, and no other primitive checks.

use crate::buffer::NoteBuffer;

use super::entry::{Piece, TableLine};

/// Seam position inside the previous piece when a deletion fused the
/// neighbours, `None` when no fuse happened
///
/// Must be computed before the deletion runs; afterwards the seam is
/// indistinguishable from the rest of the fused piece.
pub(crate) fn make_merge_info(lines: &[TableLine], line: usize, entry_index: usize) -> Option<usize> {
    let table_line = &lines[line];

    // no merging possible at the edges of the line
    if entry_index == 0 || entry_index == table_line.len() - 1 {
        return None;
    }

    let before = table_line[entry_index - 1];
    let after = table_line[entry_index + 1];

    (before.start_index + before.byte_length == after.start_index).then_some(before.display_length)
}

pub(crate) fn grow_entry_rhs(entry: &mut Piece, display_amt: usize, byte_amt: usize) {
    entry.display_length += display_amt;
    entry.byte_length += byte_amt;
}

pub(crate) fn shrink_entry_rhs(entry: &mut Piece, display_amt: usize, byte_amt: usize) {
    debug_assert!(display_amt <= entry.display_length && byte_amt <= entry.byte_length);

    entry.display_length -= display_amt;
    entry.byte_length -= byte_amt;
}

pub(crate) fn shrink_entry_lhs(entry: &mut Piece, display_amt: usize, byte_amt: usize) {
    debug_assert!(display_amt <= entry.display_length && byte_amt <= entry.byte_length);

    entry.start_index += byte_amt;
    entry.display_length -= display_amt;
    entry.byte_length -= byte_amt;
}

pub(crate) fn unshrink_entry_lhs(entry: &mut Piece, display_amt: usize, byte_amt: usize) {
    debug_assert!(entry.start_index >= byte_amt);

    entry.start_index -= byte_amt;
    entry.display_length += display_amt;
    entry.byte_length += byte_amt;
}

pub(crate) fn insert_entry_naive(lines: &mut [TableLine], line: usize, entry_index: usize, entry: Piece) {
    lines[line].insert(entry_index, entry);
}

/// Remove piece `entry_index`; if its neighbours become buffer-adjacent,
/// fuse them
pub(crate) fn delete_entry_and_merge(lines: &mut [TableLine], line: usize, entry_index: usize) {
    let table_line = &mut lines[line];
    let mut fused = false;

    if entry_index > 0 && entry_index + 1 < table_line.len() {
        let before = table_line[entry_index - 1];
        let after = table_line[entry_index + 1];

        if before.start_index + before.byte_length == after.start_index {
            let kept = &mut table_line[entry_index - 1];
            kept.display_length += after.display_length;
            kept.byte_length += after.byte_length;
            fused = true;
        }
    }

    if fused {
        table_line.drain(entry_index..entry_index + 2);
    } else {
        table_line.remove(entry_index);
    }
}

/// Split the piece at `original_entry_index` at display position
/// `pos_in_entry` and place `entry` between the halves
///
/// `pos_in_entry` must be strictly inside the piece; insertion at a
/// boundary uses `insert_entry_naive` instead.
pub(crate) fn split_entry_and_insert(
    lines: &mut [TableLine],
    buf: &NoteBuffer,
    line: usize,
    original_entry_index: usize,
    pos_in_entry: usize,
    entry: Piece,
) {
    let table_line = &mut lines[line];
    let original = table_line[original_entry_index];
    debug_assert!(pos_in_entry >= 1 && pos_in_entry < original.display_length);

    let left_bytes = original.byte_offset_of(buf.piece_str(&original), pos_in_entry);

    let right = Piece {
        start_index: original.start_index + left_bytes,
        display_length: original.display_length - pos_in_entry,
        byte_length: original.byte_length - left_bytes,
    };

    let left = &mut table_line[original_entry_index];
    left.display_length = pos_in_entry;
    left.byte_length = left_bytes;

    table_line.insert_from_slice(original_entry_index + 1, &[entry, right]);
}

/// Undo `split_entry_and_insert`: deleting the inserted piece re-fuses
/// the buffer-adjacent halves around it
pub(crate) fn undo_split_entry_and_insert(lines: &mut [TableLine], line: usize, original_entry_index: usize) {
    delete_entry_and_merge(lines, line, original_entry_index + 1);
}

/// Excise the display range `[l_boundary_pos, r_boundary_pos)` from
/// inside the piece at `original_entry_index`, leaving two pieces
///
/// `l_boundary_pos` must be at least 1 (a range touching the left edge
/// uses `shrink_entry_lhs`) and `r_boundary_pos` strictly inside the
/// piece (a range touching the right edge uses `shrink_entry_rhs`).
pub(crate) fn split_entry_remove_inside(
    lines: &mut [TableLine],
    buf: &NoteBuffer,
    line: usize,
    original_entry_index: usize,
    l_boundary_pos: usize,
    r_boundary_pos: usize,
) {
    let table_line = &mut lines[line];
    let original = table_line[original_entry_index];
    debug_assert!(l_boundary_pos >= 1 && l_boundary_pos <= r_boundary_pos);
    debug_assert!(r_boundary_pos < original.display_length);

    let text = buf.piece_str(&original);
    let left_bytes = original.byte_offset_of(text, l_boundary_pos);
    let skipped_bytes = original.byte_offset_of(text, r_boundary_pos);

    let right = Piece {
        start_index: original.start_index + skipped_bytes,
        display_length: original.display_length - r_boundary_pos,
        byte_length: original.byte_length - skipped_bytes,
    };

    let left = &mut table_line[original_entry_index];
    left.display_length = l_boundary_pos;
    left.byte_length = left_bytes;

    table_line.insert(original_entry_index + 1, right);
}

/// Undo `split_entry_remove_inside`: stretch the left half back over the
/// excised range and absorb the right half
///
/// The excised bytes still sit in the buffer between the halves, so the
/// recorded `r_boundary_pos` and the halves' offsets are enough.
pub(crate) fn undo_split_entry_remove_inside(
    lines: &mut [TableLine],
    line: usize,
    original_entry_index: usize,
    r_boundary_pos: usize,
) {
    let table_line = &mut lines[line];
    debug_assert!(original_entry_index + 1 < table_line.len());

    let snd_half = table_line[original_entry_index + 1];

    let original = &mut table_line[original_entry_index];
    original.display_length = r_boundary_pos + snd_half.display_length;
    original.byte_length = (snd_half.start_index - original.start_index) + snd_half.byte_length;

    table_line.remove(original_entry_index + 1);
}

/// Undo `delete_entry_and_merge`: re-insert the deleted piece, splitting
/// the fused neighbour apart when a merge was recorded
pub(crate) fn undo_delete_entry_and_merge(
    lines: &mut [TableLine],
    buf: &NoteBuffer,
    line: usize,
    entry_index: usize,
    entry: Piece,
    merge_pos_in_prev: Option<usize>,
) {
    match merge_pos_in_prev {
        Some(seam) if entry_index > 0 => {
            split_entry_and_insert(lines, buf, line, entry_index - 1, seam, entry);
        }
        _ => insert_entry_naive(lines, line, entry_index, entry),
    }
}

/// Insert a line break at display position `pos` of `line`
///
/// `pos == 0` inserts an empty line above; otherwise an empty line goes
/// below and the suffix of `line` past `pos` moves into it, splitting a
/// straddling piece if necessary. The buffer is only needed for the
/// multibyte straddle case.
pub(crate) fn split_lines(lines: &mut Vec<TableLine>, buf: Option<&NoteBuffer>, line: usize, pos: usize) {
    if pos == 0 {
        let at = line.min(lines.len());
        lines.insert(at, TableLine::new());
        return;
    }

    let at = (line + 1).min(lines.len());
    lines.insert(at, TableLine::new());

    if lines[line].is_empty() {
        return;
    }

    let mut moved = TableLine::new();
    {
        let fst = &mut lines[line];
        let mut ignored = 0usize;
        let mut from = fst.len();

        for i in 0..fst.len() {
            if ignored >= pos {
                from = i;
                break;
            }

            let piece = fst[i];
            if ignored + piece.display_length > pos {
                // the break falls inside this piece: split it
                let keep = pos - ignored;
                let kept_bytes = if piece.is_ascii() {
                    keep
                } else {
                    let buf = buf.expect("splitting a multibyte piece requires the note buffer");
                    piece.byte_offset_of(buf.piece_str(&piece), keep)
                };

                moved.push(Piece {
                    start_index: piece.start_index + kept_bytes,
                    display_length: piece.display_length - keep,
                    byte_length: piece.byte_length - kept_bytes,
                });
                fst[i].display_length = keep;
                fst[i].byte_length = kept_bytes;

                from = i + 1;
                break;
            }

            ignored += piece.display_length;
        }

        moved.extend(fst.drain(from..));
    }

    lines[line + 1] = moved;
}

/// Append the contents of line `line_after + 1` onto `line_after` and
/// erase it, fusing the seam pieces when they are buffer-adjacent
pub(crate) fn join_lines(lines: &mut Vec<TableLine>, line_after: usize) {
    debug_assert!(line_after + 1 < lines.len());

    let snd = lines.remove(line_after + 1);
    let fst = &mut lines[line_after];

    if snd.is_empty() {
        return;
    }
    if fst.is_empty() {
        *fst = snd;
        return;
    }

    let mut rest = snd.as_slice();
    if let (Some(back), Some(front)) = (fst.last_mut(), snd.first()) {
        if back.start_index + back.byte_length == front.start_index {
            back.display_length += front.display_length;
            back.byte_length += front.byte_length;
            rest = &snd[1..];
        }
    }

    fst.extend_from_slice(rest);
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

    fn one_line(pieces: &[Piece]) -> Vec<TableLine> {
        vec![TableLine::from_slice(pieces)]
    }

    #[test]
    fn test_grow_shrink_rhs_roundtrip() {
        let mut p = piece(0, 3, 3);
        grow_entry_rhs(&mut p, 2, 4);
        assert_eq!(p, piece(0, 5, 7));
        shrink_entry_rhs(&mut p, 2, 4);
        assert_eq!(p, piece(0, 3, 3));
    }

    #[test]
    fn test_shrink_unshrink_lhs_roundtrip() {
        let mut p = piece(4, 5, 6);
        shrink_entry_lhs(&mut p, 1, 2);
        assert_eq!(p, piece(6, 4, 4));
        unshrink_entry_lhs(&mut p, 1, 2);
        assert_eq!(p, piece(4, 5, 6));
    }

    #[test]
    fn test_delete_entry_fuses_adjacent_neighbours() {
        // [0..3) [10..12) [3..6): deleting the middle piece makes the
        // outer two buffer-adjacent
        let mut lines = one_line(&[piece(0, 3, 3), piece(10, 2, 2), piece(3, 3, 3)]);

        assert_eq!(make_merge_info(&lines, 0, 1), Some(3));
        delete_entry_and_merge(&mut lines, 0, 1);

        assert_eq!(lines[0].len(), 1);
        assert_eq!(lines[0][0], piece(0, 6, 6));
    }

    #[test]
    fn test_delete_entry_without_fuse() {
        let mut lines = one_line(&[piece(0, 3, 3), piece(10, 2, 2), piece(20, 3, 3)]);

        assert_eq!(make_merge_info(&lines, 0, 1), None);
        delete_entry_and_merge(&mut lines, 0, 1);

        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3), piece(20, 3, 3)]);
    }

    #[test]
    fn test_undo_delete_entry_with_merge_restores_split() {
        let mut lines = one_line(&[piece(0, 3, 3), piece(10, 2, 2), piece(3, 3, 3)]);
        let deleted = lines[0][1];
        let merge = make_merge_info(&lines, 0, 1);

        let mut buf = NoteBuffer::new();
        buf.append_str("abcdefghij__"); // backing bytes for the ASCII pieces

        delete_entry_and_merge(&mut lines, 0, 1);
        undo_delete_entry_and_merge(&mut lines, &buf, 0, 1, deleted, merge);

        assert_eq!(
            lines[0].as_slice(),
            &[piece(0, 3, 3), piece(10, 2, 2), piece(3, 3, 3)]
        );
    }

    #[test]
    fn test_split_insert_and_undo() {
        let mut buf = NoteBuffer::new();
        let base = buf.append_str("abcdef");
        let new = buf.append_str("XY");

        let mut lines = one_line(&[base]);
        split_entry_and_insert(&mut lines, &buf, 0, 0, 2, new);

        assert_eq!(
            lines[0].as_slice(),
            &[piece(0, 2, 2), new, piece(2, 4, 4)]
        );

        undo_split_entry_and_insert(&mut lines, 0, 0);
        assert_eq!(lines[0].as_slice(), &[base]);
    }

    #[test]
    fn test_split_remove_inside_and_undo() {
        let mut buf = NoteBuffer::new();
        let base = buf.append_str("héllo");

        let mut lines = one_line(&[base]);
        split_entry_remove_inside(&mut lines, &buf, 0, 0, 1, 2);

        // "h" + "llo": the two-byte é is gone from display
        assert_eq!(lines[0].as_slice(), &[piece(0, 1, 1), piece(3, 3, 3)]);

        undo_split_entry_remove_inside(&mut lines, 0, 0, 2);
        assert_eq!(lines[0].as_slice(), &[base]);
    }

    #[test]
    fn test_split_lines_at_zero_inserts_empty_line_above() {
        let mut lines = one_line(&[piece(0, 3, 3)]);
        split_lines(&mut lines, None, 0, 0);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_empty());
        assert_eq!(lines[1].as_slice(), &[piece(0, 3, 3)]);
    }

    #[test]
    fn test_split_lines_moves_suffix() {
        let mut buf = NoteBuffer::new();
        let base = buf.append_str("abcdef");

        let mut lines = one_line(&[base]);
        split_lines(&mut lines, Some(&buf), 0, 3);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3)]);
        assert_eq!(lines[1].as_slice(), &[piece(3, 3, 3)]);
    }

    #[test]
    fn test_split_lines_at_piece_boundary_moves_whole_pieces() {
        let mut lines = one_line(&[piece(0, 3, 3), piece(10, 2, 2)]);
        split_lines(&mut lines, None, 0, 3);

        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3)]);
        assert_eq!(lines[1].as_slice(), &[piece(10, 2, 2)]);
    }

    #[test]
    fn test_split_lines_past_end_leaves_empty_second_line() {
        let mut lines = one_line(&[piece(0, 3, 3)]);
        split_lines(&mut lines, None, 0, 3);

        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3)]);
        assert!(lines[1].is_empty());
    }

    #[test]
    fn test_join_lines_fuses_adjacent_seam() {
        let mut lines = vec![
            TableLine::from_slice(&[piece(0, 3, 3)]),
            TableLine::from_slice(&[piece(3, 3, 3)]),
        ];
        join_lines(&mut lines, 0);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_slice(), &[piece(0, 6, 6)]);
    }

    #[test]
    fn test_join_lines_keeps_non_adjacent_pieces() {
        let mut lines = vec![
            TableLine::from_slice(&[piece(0, 3, 3)]),
            TableLine::from_slice(&[piece(10, 2, 2)]),
        ];
        join_lines(&mut lines, 0);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3), piece(10, 2, 2)]);
    }

    #[test]
    fn test_join_lines_into_empty_line() {
        let mut lines = vec![TableLine::new(), TableLine::from_slice(&[piece(0, 3, 3)])];
        join_lines(&mut lines, 0);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_slice(), &[piece(0, 3, 3)]);
    }

    #[test]
    fn test_split_then_join_restores_single_piece() {
        let mut buf = NoteBuffer::new();
        let base = buf.append_str("abcdef");

        let mut lines = one_line(&[base]);
        split_lines(&mut lines, Some(&buf), 0, 3);
        join_lines(&mut lines, 0);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_slice(), &[base]);
    }
}
