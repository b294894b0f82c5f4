//! The text of one note: piece-table lines with a coalescing undo history
//!
//! [`NoteText`] stores a note body as lines of pieces pointing into the
//! shared [`crate::buffer::NoteBuffer`]. Every mutation happens through a
//! reversible table command so it can be undone exactly; the public edit
//! operations additionally coalesce bursts of adjacent keystrokes into a
//! single history entry by rewriting the top command in place instead of
//! appending a new one.

pub mod command;
pub mod entry;
mod table;
mod token;

use std::cmp::Ordering;
use std::rc::Rc;

use crate::buffer::BufferRef;
use crate::character;
use crate::error::TextError;

use command::{CmdName, TableCommand};
use entry::{entry_index_within_line, Piece, TableLine};
use token::{EditKind, EditToken};

/// History entries kept before the oldest half is dropped
const MAX_HIST_LEN: usize = 10_000;

/// Where the last coalescible command lives in the history
enum Slot {
    /// The top of the history itself
    Top,
    /// Child `i` of a `Multi` at the top of the history
    Child(usize),
}

/// The editable body of a single note
pub struct NoteText {
    lines: Vec<TableLine>,
    buffer: Option<BufferRef>,
    hist: Vec<TableCommand>,
    hist_pos: usize,
    token: EditToken,
}

impl NoteText {
    /// Empty text: one empty line, no buffer, no history
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: vec![TableLine::new()],
            buffer: None,
            hist: Vec::new(),
            hist_pos: 0,
            token: EditToken::default(),
        }
    }

    /// Single line holding `piece` (or nothing, if the piece is empty)
    #[must_use]
    pub fn new_from_piece(piece: Piece, buffer: &BufferRef) -> Self {
        let mut line = TableLine::new();
        if piece.display_length > 0 {
            line.push(piece);
        }

        Self {
            lines: vec![line],
            buffer: Some(Rc::clone(buffer)),
            hist: Vec::new(),
            hist_pos: 0,
            token: EditToken::default(),
        }
    }

    /// Append a new line during bulk loading
    pub fn add_line(&mut self, piece: Piece, buffer: &BufferRef) -> Result<(), TextError> {
        self.attach_buffer(buffer)?;

        let mut line = TableLine::new();
        if piece.display_length > 0 {
            line.push(piece);
        }
        self.lines.push(line);
        Ok(())
    }

    /// Deep copy of the lines; the history is not copied
    #[must_use]
    pub fn make_copy(&self) -> Self {
        Self {
            lines: self.lines.clone(),
            buffer: self.buffer.clone(),
            hist: Vec::new(),
            hist_pos: 0,
            token: EditToken::default(),
        }
    }

    /* Public string operations */

    /// Insert `piece` at display position `pos` of `line`
    ///
    /// Out-of-range positions are clamped, never errors: a bad `line`
    /// becomes the last line, a bad `pos` the line end. An empty piece is
    /// a no-op. Returns whether a fresh history entry was added (false
    /// when the keystroke coalesced into the previous one, or on a
    /// no-op) and the cursor advance in codepoints.
    pub fn insert_str(
        &mut self,
        line: usize,
        pos: usize,
        piece: Piece,
        buffer: &BufferRef,
    ) -> Result<(bool, usize), TextError> {
        self.attach_buffer(buffer)?;

        if piece.display_length == 0 {
            return Ok((false, 0));
        }

        let line = line.min(self.lines.len() - 1);
        let pos = pos.min(self.line_length(line));

        // index of the table entry to merge the insertion into; if none,
        // a new command is issued instead
        let mut merge_entry_idx: Option<usize> = None;

        if self.token.check(EditKind::Insertion, line, pos) && !self.hist.is_empty() {
            // locate the previously inserted-into entry: its right edge
            // must sit exactly at pos and its buffer range must continue
            // into the new piece
            let mut sum_pos = 0usize;
            for (idx, entry) in self.lines[line].iter().enumerate() {
                sum_pos += entry.display_length;
                if pos < sum_pos {
                    break;
                }
                if pos == sum_pos {
                    if entry.start_index + entry.byte_length == piece.start_index {
                        merge_entry_idx = Some(idx);
                    }
                    break;
                }
            }

            if merge_entry_idx.is_some() && !self.grow_hist_top(line, &piece) {
                // cannot edit history, revert to generating a new command
                merge_entry_idx = None;
            }
        }

        if let Some(idx) = merge_entry_idx {
            // history was grown in place; mirror it in the table
            table::grow_entry_rhs(
                &mut self.lines[line][idx],
                piece.display_length,
                piece.byte_length,
            );
        } else if pos == 0 {
            self.exec(TableCommand::InsertEntry {
                line,
                entry_index: 0,
                inserted: piece,
            });
        } else {
            let mut accumulated = 0usize;
            let table_len = self.lines[line].len();

            for i in 0..table_len {
                let entry = self.lines[line][i];

                if pos < accumulated + entry.display_length {
                    // pos lies strictly inside entry i: split it
                    self.exec(TableCommand::SplitInsert {
                        line,
                        original_entry_index: i,
                        pos_in_entry: pos - accumulated,
                        inserted: piece,
                    });
                    break;
                } else if pos == accumulated + entry.display_length || i + 1 == table_len {
                    // pos is immediately after entry i: grow it when the
                    // buffer ranges touch, otherwise splice a new entry
                    if entry.start_index + entry.byte_length == piece.start_index {
                        self.exec(TableCommand::GrowRhs {
                            line,
                            entry_index: i,
                            display_amt: piece.display_length,
                            byte_amt: piece.byte_length,
                        });
                    } else {
                        self.exec(TableCommand::InsertEntry {
                            line,
                            entry_index: i + 1,
                            inserted: piece,
                        });
                    }
                    break;
                }

                accumulated += entry.display_length;
            }
        }

        self.token
            .acquire(EditKind::Insertion, line, pos + piece.display_length);
        Ok((merge_entry_idx.is_none(), piece.display_length))
    }

    /// Delete the codepoint before display position `pos` of `line`
    ///
    /// A no-op at the start of a line or on an out-of-range line.
    /// Returns whether a fresh history entry was added and the cursor
    /// retreat (1, or 0 on a no-op).
    pub fn delete_char_before(&mut self, line: usize, pos: usize) -> (bool, usize) {
        if pos == 0 || line >= self.lines.len() {
            // cannot delete before the first char in a line
            return (false, 0);
        }

        let mut cursor_dec = 0usize;
        let mut command_merged = false;
        let mut new_command_issued = false;

        if self.token.check(EditKind::DeleteBefore, line, pos) && !self.hist.is_empty() {
            if let Some((entry_idx, pos_in_entry)) =
                entry_index_within_line(&self.lines[line], pos - 1)
            {
                if self.coalesce_delete_before(line, entry_idx, pos_in_entry) {
                    cursor_dec = 1;
                    command_merged = true;
                    new_command_issued = true;
                }
            }
        }

        if !new_command_issued {
            let mut accumulated = 0usize;
            for i in 0..self.lines[line].len() {
                let entry = self.lines[line][i];
                if entry.display_length == 0 {
                    continue;
                }

                if pos == accumulated + entry.display_length {
                    if entry.display_length == 1 {
                        // delete the whole entry instead of shrinking
                        let merge = table::make_merge_info(&self.lines, line, i);
                        self.exec(TableCommand::DeleteEntry {
                            line,
                            entry_index: i,
                            deleted: entry,
                            merge_pos_in_prev: merge,
                        });
                    } else {
                        let byte_amt = self.entry_last_char_len(&entry);
                        self.exec(TableCommand::ShrinkRhs {
                            line,
                            entry_index: i,
                            display_amt: 1,
                            byte_amt,
                        });
                    }
                    cursor_dec = 1;
                    new_command_issued = true;
                    break;
                } else if pos == accumulated + 1 {
                    // the char before pos is the first char of entry i
                    let byte_amt = self.entry_first_char_len(&entry);
                    self.exec(TableCommand::ShrinkLhs {
                        line,
                        entry_index: i,
                        display_amt: 1,
                        byte_amt,
                    });
                    cursor_dec = 1;
                    new_command_issued = true;
                    break;
                } else if pos < accumulated + entry.display_length {
                    self.exec(TableCommand::SplitDelete {
                        line,
                        original_entry_index: i,
                        l_boundary_pos: pos - 1 - accumulated,
                        r_boundary_pos: pos - accumulated,
                    });
                    cursor_dec = 1;
                    new_command_issued = true;
                    break;
                }

                accumulated += entry.display_length;
            }
        }

        self.token
            .acquire(EditKind::DeleteBefore, line, pos - cursor_dec);
        (!command_merged && new_command_issued, cursor_dec)
    }

    /// Delete the codepoint at display position `pos` of `line`
    ///
    /// The cursor does not move. Returns whether a fresh history entry
    /// was added (false when coalesced or when nothing was deleted).
    pub fn delete_char_current(&mut self, line: usize, pos: usize) -> bool {
        if line >= self.lines.len() {
            return false;
        }

        let mut command_merged = false;
        let mut new_command_issued = false;

        if self.token.check(EditKind::DeleteCurrent, line, pos) && !self.hist.is_empty() {
            if let Some((entry_idx, pos_in_entry)) =
                entry_index_within_line(&self.lines[line], pos)
            {
                if self.coalesce_delete_current(line, entry_idx, pos_in_entry) {
                    command_merged = true;
                    new_command_issued = true;
                }
            }
        }

        if !new_command_issued {
            let mut accumulated = 0usize;
            for i in 0..self.lines[line].len() {
                let entry = self.lines[line][i];
                if entry.display_length == 0 {
                    continue;
                }

                if pos == accumulated {
                    if entry.display_length == 1 {
                        let merge = table::make_merge_info(&self.lines, line, i);
                        self.exec(TableCommand::DeleteEntry {
                            line,
                            entry_index: i,
                            deleted: entry,
                            merge_pos_in_prev: merge,
                        });
                    } else {
                        let byte_amt = self.entry_first_char_len(&entry);
                        self.exec(TableCommand::ShrinkLhs {
                            line,
                            entry_index: i,
                            display_amt: 1,
                            byte_amt,
                        });
                    }
                    new_command_issued = true;
                    break;
                } else if pos == accumulated + entry.display_length - 1 {
                    let byte_amt = self.entry_last_char_len(&entry);
                    self.exec(TableCommand::ShrinkRhs {
                        line,
                        entry_index: i,
                        display_amt: 1,
                        byte_amt,
                    });
                    new_command_issued = true;
                    break;
                } else if pos < accumulated + entry.display_length - 1 {
                    self.exec(TableCommand::SplitDelete {
                        line,
                        original_entry_index: i,
                        l_boundary_pos: pos - accumulated,
                        r_boundary_pos: pos + 1 - accumulated,
                    });
                    new_command_issued = true;
                    break;
                }

                accumulated += entry.display_length;
            }
        }

        self.token.acquire(EditKind::DeleteCurrent, line, pos);
        !command_merged && new_command_issued
    }

    /// Break `line` in two at display position `pos`
    ///
    /// Rejected (returns false) when `line` or `pos` is out of range.
    pub fn make_line_break(&mut self, line: usize, pos: usize) -> bool {
        if line >= self.line_count() || pos > self.line_length(line) {
            return false;
        }

        self.exec(TableCommand::LineBreak {
            line_before: line,
            pos_before: pos,
        });

        self.token.acquire(EditKind::LineBreak, line, pos);
        true
    }

    /// Join `line` with the line below it
    ///
    /// Rejected (returns false) when no line exists below.
    pub fn make_line_join(&mut self, line: usize) -> bool {
        if line + 1 >= self.line_count() {
            return false;
        }

        let pos_after = self.line_length(line);
        self.exec(TableCommand::LineJoin {
            line_after: line,
            pos_after,
        });

        self.token.acquire(EditKind::LineJoin, line, pos_after);
        true
    }

    /* Undo and redo */

    /// Undo the most recent command; false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        if self.hist_pos == 0 {
            return false;
        }

        self.token.reset();
        self.hist_pos -= 1;
        let cmd = self.hist[self.hist_pos].clone();
        self.invoke_reverse(&cmd);
        true
    }

    /// Re-apply the most recently undone command; false when there is
    /// nothing to redo
    pub fn redo(&mut self) -> bool {
        if self.hist_pos >= self.hist.len() {
            return false;
        }

        self.token.reset();
        let cmd = self.hist[self.hist_pos].clone();
        self.invoke(&cmd);
        self.hist_pos += 1;
        true
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.hist_pos > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.hist_pos < self.hist.len()
    }

    /// Forget the coalescing context
    ///
    /// Call on any user action outside this engine (cursor motion, focus
    /// change) so the next keystroke starts a fresh history entry.
    pub fn reset_token(&mut self) {
        self.token.reset();
    }

    /* Read-only queries */

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Display length (codepoint count) of `line`, 0 when out of range
    #[must_use]
    pub fn line_length(&self, line: usize) -> usize {
        self.lines
            .get(line)
            .map_or(0, |l| l.iter().map(|p| p.display_length).sum())
    }

    /// The full content of `line` as an owned string
    pub fn to_str(&self, line: usize) -> Result<String, TextError> {
        let table_line = &self.lines[line];

        match &self.buffer {
            None if table_line.is_empty() => Ok(String::new()),
            None => Err(TextError::MissingBuffer),
            Some(buffer) => {
                let buf = buffer.borrow();
                let mut out = String::with_capacity(table_line.iter().map(|p| p.byte_length).sum());
                for s in buf.to_str_view(table_line) {
                    out.push_str(s);
                }
                Ok(out)
            }
        }
    }

    /// The display range `[pos, pos + len)` of `line`, clipped to the line
    pub fn to_substr(&self, line: usize, pos: usize, len: usize) -> Result<String, TextError> {
        let table_line = &self.lines[line];

        match &self.buffer {
            None if table_line.is_empty() => Ok(String::new()),
            None => Err(TextError::MissingBuffer),
            Some(buffer) => {
                let buf = buffer.borrow();
                let mut out = String::new();
                for s in buf.to_substr_view(table_line, pos, len) {
                    out.push_str(s);
                }
                Ok(out)
            }
        }
    }

    /// The codepoint at display position `pos` of `line`, `None` when
    /// `pos` is at or beyond the line end
    pub fn char_at(&self, line: usize, pos: usize) -> Result<Option<char>, TextError> {
        let table_line = &self.lines[line];

        let Some((entry_idx, pos_in_entry)) = entry_index_within_line(table_line, pos) else {
            return Ok(None);
        };
        let Some(buffer) = &self.buffer else {
            return Err(TextError::MissingBuffer);
        };

        let buf = buffer.borrow();
        let entry = table_line[entry_idx];
        let text = buf.piece_str(&entry);

        if entry.is_ascii() {
            Ok(Some(text.as_bytes()[pos_in_entry] as char))
        } else {
            Ok(text.chars().nth(pos_in_entry))
        }
    }

    /// Terminal column width of `line`
    pub fn line_width(&self, line: usize) -> Result<usize, TextError> {
        let table_line = &self.lines[line];

        match &self.buffer {
            None if table_line.is_empty() => Ok(0),
            None => Err(TextError::MissingBuffer),
            Some(buffer) => {
                let buf = buffer.borrow();
                Ok(table_line
                    .iter()
                    .map(|p| character::str_width(buf.piece_str(p)))
                    .sum())
            }
        }
    }

    /// Classify the command an `undo` would revert
    #[must_use]
    pub fn get_current_cmd_name(&self) -> CmdName {
        if self.hist_pos == 0 {
            CmdName::None
        } else {
            self.hist[self.hist_pos - 1].name()
        }
    }

    /// True when the history is empty and no line holds any piece
    #[must_use]
    pub fn empty(&self) -> bool {
        self.hist.is_empty() && self.empty_of_content()
    }

    /// True when no line holds any piece, regardless of history
    #[must_use]
    pub fn empty_of_content(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    /* Buffer management */

    /// Adopt `buffer` on first contact; reject any other buffer afterwards
    fn attach_buffer(&mut self, buffer: &BufferRef) -> Result<(), TextError> {
        match &self.buffer {
            None => {
                log::trace!("attaching note buffer to text");
                self.buffer = Some(Rc::clone(buffer));
                Ok(())
            }
            Some(own) if Rc::ptr_eq(own, buffer) => Ok(()),
            Some(_) => Err(TextError::BufferMismatch),
        }
    }

    /* Command engine */

    /// Apply `cmd`, record it, and make it the new top of history
    fn exec(&mut self, cmd: TableCommand) {
        self.clear_hist_if_needed();
        self.invoke(&cmd);
        self.hist.push(cmd);
        self.hist_pos = self.hist.len();
    }

    /// Drop the redo tail, or halve the history once it hits the cap
    fn clear_hist_if_needed(&mut self) {
        match self.hist_pos.cmp(&self.hist.len()) {
            Ordering::Less => {
                log::debug!(
                    "discarding {} redoable command(s)",
                    self.hist.len() - self.hist_pos
                );
                self.hist.truncate(self.hist_pos);
                self.hist.shrink_to_fit();
            }
            Ordering::Equal => {
                if self.hist_pos == MAX_HIST_LEN {
                    log::debug!("history reached {MAX_HIST_LEN} entries, dropping oldest half");
                    self.hist.drain(..self.hist_pos / 2);
                    self.hist_pos = self.hist.len();
                }
            }
            Ordering::Greater => {
                panic!(
                    "history cursor {} is beyond history length {}",
                    self.hist_pos,
                    self.hist.len()
                );
            }
        }
    }

    /// Apply `cmd` to the piece table
    fn invoke(&mut self, cmd: &TableCommand) {
        let Some(buffer) = self.buffer.clone() else {
            // without a buffer only structural line commands are legal
            match cmd {
                TableCommand::LineBreak {
                    line_before,
                    pos_before,
                } if *pos_before == 0 => {
                    table::split_lines(&mut self.lines, None, *line_before, 0);
                }
                TableCommand::LineJoin { line_after, .. } => {
                    table::join_lines(&mut self.lines, *line_after);
                }
                TableCommand::Multi { commands } => {
                    for c in commands {
                        self.invoke(c);
                    }
                }
                _ => panic!("content command invoked with no note buffer attached"),
            }
            return;
        };
        let buf = buffer.borrow();

        match cmd {
            TableCommand::SplitInsert {
                line,
                original_entry_index,
                pos_in_entry,
                inserted,
            } => table::split_entry_and_insert(
                &mut self.lines,
                &buf,
                *line,
                *original_entry_index,
                *pos_in_entry,
                *inserted,
            ),
            TableCommand::SplitDelete {
                line,
                original_entry_index,
                l_boundary_pos,
                r_boundary_pos,
            } => table::split_entry_remove_inside(
                &mut self.lines,
                &buf,
                *line,
                *original_entry_index,
                *l_boundary_pos,
                *r_boundary_pos,
            ),
            TableCommand::GrowRhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => table::grow_entry_rhs(&mut self.lines[*line][*entry_index], *display_amt, *byte_amt),
            TableCommand::ShrinkRhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                table::shrink_entry_rhs(&mut self.lines[*line][*entry_index], *display_amt, *byte_amt);
            }
            TableCommand::ShrinkLhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                table::shrink_entry_lhs(&mut self.lines[*line][*entry_index], *display_amt, *byte_amt);
            }
            TableCommand::InsertEntry {
                line,
                entry_index,
                inserted,
            } => table::insert_entry_naive(&mut self.lines, *line, *entry_index, *inserted),
            TableCommand::DeleteEntry {
                line, entry_index, ..
            } => table::delete_entry_and_merge(&mut self.lines, *line, *entry_index),
            TableCommand::LineBreak {
                line_before,
                pos_before,
            } => table::split_lines(&mut self.lines, Some(&*buf), *line_before, *pos_before),
            TableCommand::LineJoin { line_after, .. } => {
                table::join_lines(&mut self.lines, *line_after);
            }
            TableCommand::Multi { commands } => {
                drop(buf);
                for c in commands {
                    self.invoke(c);
                }
            }
        }
    }

    /// Apply the exact inverse of `cmd` to the piece table
    fn invoke_reverse(&mut self, cmd: &TableCommand) {
        let Some(buffer) = self.buffer.clone() else {
            match cmd {
                TableCommand::LineBreak { line_before, .. } => {
                    table::join_lines(&mut self.lines, *line_before);
                }
                TableCommand::LineJoin {
                    line_after,
                    pos_after,
                } if *pos_after == 0 => {
                    table::split_lines(&mut self.lines, None, *line_after, 0);
                }
                TableCommand::Multi { commands } => {
                    for c in commands.iter().rev() {
                        self.invoke_reverse(c);
                    }
                }
                _ => panic!("content command reversed with no note buffer attached"),
            }
            return;
        };
        let buf = buffer.borrow();

        match cmd {
            TableCommand::SplitInsert {
                line,
                original_entry_index,
                ..
            } => table::undo_split_entry_and_insert(&mut self.lines, *line, *original_entry_index),
            TableCommand::SplitDelete {
                line,
                original_entry_index,
                r_boundary_pos,
                ..
            } => table::undo_split_entry_remove_inside(
                &mut self.lines,
                *line,
                *original_entry_index,
                *r_boundary_pos,
            ),
            TableCommand::GrowRhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                table::shrink_entry_rhs(&mut self.lines[*line][*entry_index], *display_amt, *byte_amt);
            }
            TableCommand::ShrinkRhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => table::grow_entry_rhs(&mut self.lines[*line][*entry_index], *display_amt, *byte_amt),
            TableCommand::ShrinkLhs {
                line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                table::unshrink_entry_lhs(
                    &mut self.lines[*line][*entry_index],
                    *display_amt,
                    *byte_amt,
                );
            }
            TableCommand::InsertEntry {
                line, entry_index, ..
            } => table::delete_entry_and_merge(&mut self.lines, *line, *entry_index),
            TableCommand::DeleteEntry {
                line,
                entry_index,
                deleted,
                merge_pos_in_prev,
            } => table::undo_delete_entry_and_merge(
                &mut self.lines,
                &buf,
                *line,
                *entry_index,
                *deleted,
                *merge_pos_in_prev,
            ),
            TableCommand::LineBreak { line_before, .. } => {
                table::join_lines(&mut self.lines, *line_before);
            }
            TableCommand::LineJoin {
                line_after,
                pos_after,
            } => table::split_lines(&mut self.lines, Some(&*buf), *line_after, *pos_after),
            TableCommand::Multi { commands } => {
                drop(buf);
                for c in commands.iter().rev() {
                    self.invoke_reverse(c);
                }
            }
        }
    }

    /* Keystroke coalescing */

    /// Grow the top history command in place to cover `piece`
    ///
    /// Only possible when the top is an insertion on the same line whose
    /// recorded piece is buffer-contiguous with the new one.
    fn grow_hist_top(&mut self, line: usize, piece: &Piece) -> bool {
        let Some(last) = self.hist.last_mut() else {
            return false;
        };

        match last {
            TableCommand::SplitInsert {
                line: cmd_line,
                inserted,
                ..
            }
            | TableCommand::InsertEntry {
                line: cmd_line,
                inserted,
                ..
            } if *cmd_line == line
                && inserted.start_index + inserted.byte_length == piece.start_index =>
            {
                table::grow_entry_rhs(inserted, piece.display_length, piece.byte_length);
                true
            }
            TableCommand::GrowRhs {
                line: cmd_line,
                display_amt,
                byte_amt,
                ..
            } if *cmd_line == line => {
                *display_amt += piece.display_length;
                *byte_amt += piece.byte_length;
                true
            }
            _ => false,
        }
    }

    /// The command the next deletion would extend: the top of history,
    /// descending one level into a `Multi`
    fn last_sub_cmd(&self) -> Option<(Slot, TableCommand)> {
        match self.hist.last()? {
            TableCommand::Multi { commands } => {
                let idx = commands.len().checked_sub(1)?;
                Some((Slot::Child(idx), commands[idx].clone()))
            }
            other => Some((Slot::Top, other.clone())),
        }
    }

    /// Write a rewritten command back into the slot `last_sub_cmd` found
    fn store_last_sub(&mut self, slot: Slot, cmd: TableCommand) {
        match (slot, self.hist.last_mut()) {
            (Slot::Top, Some(top)) => *top = cmd,
            (Slot::Child(idx), Some(TableCommand::Multi { commands })) => commands[idx] = cmd,
            _ => panic!("coalescing requires a live history top"),
        }
    }

    /// Try to fold a backwards deletion at `(entry_idx, pos_in_entry)`
    /// into the top history command
    fn coalesce_delete_before(&mut self, line: usize, entry_idx: usize, pos_in_entry: usize) -> bool {
        let table_len = self.lines[line].len();
        let entry = self.lines[line][entry_idx];

        let Some((slot, old)) = self.last_sub_cmd() else {
            return false;
        };

        match old {
            TableCommand::SplitDelete {
                line: cmd_line,
                original_entry_index,
                l_boundary_pos,
                r_boundary_pos,
            } if entry.display_length > 1 => {
                // widen the excised range leftwards
                let byte_amt = self.entry_last_char_len(&entry);
                table::shrink_entry_rhs(&mut self.lines[line][entry_idx], 1, byte_amt);
                self.store_last_sub(
                    slot,
                    TableCommand::SplitDelete {
                        line: cmd_line,
                        original_entry_index,
                        l_boundary_pos: l_boundary_pos - 1,
                        r_boundary_pos,
                    },
                );
                true
            }
            old @ TableCommand::SplitDelete { .. } => {
                // one char left of the excision remains; fold the whole
                // split into a single left shrink
                if entry_idx + 1 >= table_len {
                    return false;
                }
                let right_half = self.lines[line][entry_idx + 1];
                self.invoke_reverse(&old);
                let restored = self.lines[line][entry_idx];
                let repl = TableCommand::ShrinkLhs {
                    line,
                    entry_index: entry_idx,
                    display_amt: restored.display_length - right_half.display_length,
                    byte_amt: restored.byte_length - right_half.byte_length,
                };
                self.invoke(&repl);
                self.store_last_sub(slot, repl);
                true
            }
            old @ TableCommand::ShrinkRhs { .. } if entry.display_length == 1 => {
                // the shrunk piece is down to one char; replace the
                // shrink with a whole-entry deletion
                self.invoke_reverse(&old);
                let restored = self.lines[line][entry_idx];
                let merge = table::make_merge_info(&self.lines, line, entry_idx);
                let repl = TableCommand::DeleteEntry {
                    line,
                    entry_index: entry_idx,
                    deleted: restored,
                    merge_pos_in_prev: merge,
                };
                self.invoke(&repl);
                self.store_last_sub(slot, repl);
                true
            }
            TableCommand::ShrinkRhs {
                line: cmd_line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                let amt = self.entry_last_char_len(&entry);
                table::shrink_entry_rhs(&mut self.lines[line][entry_idx], 1, amt);
                self.store_last_sub(
                    slot,
                    TableCommand::ShrinkRhs {
                        line: cmd_line,
                        entry_index,
                        display_amt: display_amt + 1,
                        byte_amt: byte_amt + amt,
                    },
                );
                true
            }
            TableCommand::ShrinkLhs { .. } | TableCommand::DeleteEntry { .. } => {
                self.push_delete_sub_command(line, entry_idx, pos_in_entry)
            }
            _ => false,
        }
    }

    /// Try to fold a forwards deletion at `(entry_idx, pos_in_entry)`
    /// into the top history command; the lhs/rhs mirror of
    /// `coalesce_delete_before`
    fn coalesce_delete_current(&mut self, line: usize, entry_idx: usize, pos_in_entry: usize) -> bool {
        let entry = self.lines[line][entry_idx];

        let Some((slot, old)) = self.last_sub_cmd() else {
            return false;
        };

        match old {
            TableCommand::SplitDelete {
                line: cmd_line,
                original_entry_index,
                l_boundary_pos,
                r_boundary_pos,
            } if entry.display_length > 1 => {
                // widen the excised range rightwards
                let byte_amt = self.entry_first_char_len(&entry);
                table::shrink_entry_lhs(&mut self.lines[line][entry_idx], 1, byte_amt);
                self.store_last_sub(
                    slot,
                    TableCommand::SplitDelete {
                        line: cmd_line,
                        original_entry_index,
                        l_boundary_pos,
                        r_boundary_pos: r_boundary_pos + 1,
                    },
                );
                true
            }
            old @ TableCommand::SplitDelete { .. } => {
                // one char right of the excision remains; fold the whole
                // split into a single right shrink
                if entry_idx == 0 {
                    return false;
                }
                let left_half = self.lines[line][entry_idx - 1];
                self.invoke_reverse(&old);
                let restored = self.lines[line][entry_idx - 1];
                let repl = TableCommand::ShrinkRhs {
                    line,
                    entry_index: entry_idx - 1,
                    display_amt: restored.display_length - left_half.display_length,
                    byte_amt: restored.byte_length - left_half.byte_length,
                };
                self.invoke(&repl);
                self.store_last_sub(slot, repl);
                true
            }
            old @ TableCommand::ShrinkLhs { .. } if entry.display_length == 1 => {
                self.invoke_reverse(&old);
                let restored = self.lines[line][entry_idx];
                let merge = table::make_merge_info(&self.lines, line, entry_idx);
                let repl = TableCommand::DeleteEntry {
                    line,
                    entry_index: entry_idx,
                    deleted: restored,
                    merge_pos_in_prev: merge,
                };
                self.invoke(&repl);
                self.store_last_sub(slot, repl);
                true
            }
            TableCommand::ShrinkLhs {
                line: cmd_line,
                entry_index,
                display_amt,
                byte_amt,
            } => {
                let amt = self.entry_first_char_len(&entry);
                table::shrink_entry_lhs(&mut self.lines[line][entry_idx], 1, amt);
                self.store_last_sub(
                    slot,
                    TableCommand::ShrinkLhs {
                        line: cmd_line,
                        entry_index,
                        display_amt: display_amt + 1,
                        byte_amt: byte_amt + amt,
                    },
                );
                true
            }
            TableCommand::ShrinkRhs { .. } | TableCommand::DeleteEntry { .. } => {
                self.push_delete_sub_command(line, entry_idx, pos_in_entry)
            }
            _ => false,
        }
    }

    /// Promote the history top to a `Multi` and append a fresh
    /// sub-command for the deletion at `(entry_idx, pos_in_entry)`
    fn push_delete_sub_command(&mut self, line: usize, entry_idx: usize, pos_in_entry: usize) -> bool {
        let entry = self.lines[line][entry_idx];

        let sub = if entry.display_length == 1 {
            TableCommand::DeleteEntry {
                line,
                entry_index: entry_idx,
                deleted: entry,
                merge_pos_in_prev: table::make_merge_info(&self.lines, line, entry_idx),
            }
        } else if pos_in_entry == 0 {
            let byte_amt = self.entry_first_char_len(&entry);
            TableCommand::ShrinkLhs {
                line,
                entry_index: entry_idx,
                display_amt: 1,
                byte_amt,
            }
        } else if pos_in_entry + 1 < entry.display_length {
            TableCommand::SplitDelete {
                line,
                original_entry_index: entry_idx,
                l_boundary_pos: pos_in_entry,
                r_boundary_pos: pos_in_entry + 1,
            }
        } else {
            // pos_in_entry is the last codepoint of the piece
            let byte_amt = self.entry_last_char_len(&entry);
            TableCommand::ShrinkRhs {
                line,
                entry_index: entry_idx,
                display_amt: 1,
                byte_amt,
            }
        };

        if !matches!(self.hist.last(), Some(TableCommand::Multi { .. })) {
            if let Some(top) = self.hist.pop() {
                self.hist.push(TableCommand::Multi {
                    commands: vec![top],
                });
            }
        }

        self.invoke(&sub);
        if let Some(TableCommand::Multi { commands }) = self.hist.last_mut() {
            commands.push(sub);
        }
        true
    }

    /* Codepoint measurement against the buffer */

    /// Byte length of the first codepoint of `entry`
    fn entry_first_char_len(&self, entry: &Piece) -> usize {
        if entry.is_ascii() {
            return 1;
        }
        let buffer = self
            .buffer
            .as_ref()
            .expect("entry with content requires an attached buffer");
        let buf = buffer.borrow();
        character::first_char_len(buf.piece_str(entry))
    }

    /// Byte length of the last codepoint of `entry`
    fn entry_last_char_len(&self, entry: &Piece) -> usize {
        if entry.is_ascii() {
            return 1;
        }
        let buffer = self
            .buffer
            .as_ref()
            .expect("entry with content requires an attached buffer");
        let buf = buffer.borrow();
        character::last_char_len(buf.piece_str(entry))
    }
}

impl Default for NoteText {
    fn default() -> Self {
        Self::new()
    }
}
