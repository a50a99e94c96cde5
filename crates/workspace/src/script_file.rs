// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Script buffer model
//!
//! [`ScriptFile`] keeps the authoritative text of one editor buffer as a list
//! of logical lines and converts between 1-based (line, column) positions,
//! 0-based character offsets and substrings.
//!
//! ## Invariants
//!
//! - Stored lines never contain `\n` and never end with `\r`
//! - The buffer always holds at least one (possibly empty) line
//! - A column is valid in `[1, len + 1]`; `len + 1` is the insert position at
//!   end of line
//! - A line is valid in `[1, line_count]` for queries; `line_count + 1` is
//!   accepted only by [`ScriptFile::apply_change`], where it appends
//!
//! Columns and offsets count characters (Unicode scalar values), and the
//! flattened buffer joins lines with [`LINE_SEPARATOR`].
//!
//! ## Example
//!
//! ```rust
//! use sqltools_workspace::{BufferPosition, FileChange, ScriptFile};
//!
//! let mut file = ScriptFile::new("query.sql", "untitled:query.sql", "SELECT *\nFROM t");
//! file.apply_change(&FileChange::insert(BufferPosition::new(2, 7), "able"))?;
//! assert_eq!(file.get_line(2)?, "FROM table");
//! # Ok::<(), sqltools_workspace::ScriptFileError>(())
//! ```

use std::io::Read;

use tracing::trace;

use crate::error::{ScriptFileError, ScriptFileResult};
use crate::position::{BufferPosition, BufferRange, FileChange, PositionEncoding};
use crate::workspace::is_in_memory_uri;

/// Separator used when flattening the buffer into a single string
pub const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// An in-memory script buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// Path on disk (or the client URI for in-memory buffers)
    file_path: String,

    /// URI the client uses to refer to this buffer
    client_uri: String,

    /// Buffer content, one entry per logical line
    file_lines: Vec<String>,

    /// Whether semantic analysis should run for this buffer
    is_analysis_enabled: bool,

    /// Whether the buffer has no backing file
    is_in_memory: bool,
}

impl ScriptFile {
    /// Create a script file from an initial text blob
    pub fn new(
        file_path: impl Into<String>,
        client_uri: impl Into<String>,
        initial_text: &str,
    ) -> Self {
        let client_uri = client_uri.into();
        let is_in_memory = is_in_memory_uri(&client_uri);

        Self {
            file_path: file_path.into(),
            client_uri,
            file_lines: split_lines(initial_text),
            is_analysis_enabled: true,
            is_in_memory,
        }
    }

    /// Create a script file by draining a reader
    pub fn from_reader<R: Read>(
        file_path: impl Into<String>,
        client_uri: impl Into<String>,
        mut reader: R,
    ) -> std::io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self::new(file_path, client_uri, &text))
    }

    /// Path of the backing file
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// URI the client uses for this buffer
    pub fn client_uri(&self) -> &str {
        &self.client_uri
    }

    /// Lines of the buffer, without separators
    pub fn file_lines(&self) -> &[String] {
        &self.file_lines
    }

    /// Number of logical lines (always at least 1)
    pub fn line_count(&self) -> usize {
        self.file_lines.len()
    }

    pub fn is_analysis_enabled(&self) -> bool {
        self.is_analysis_enabled
    }

    pub fn set_analysis_enabled(&mut self, enabled: bool) {
        self.is_analysis_enabled = enabled;
    }

    pub fn is_in_memory(&self) -> bool {
        self.is_in_memory
    }

    /// Full buffer text joined with [`LINE_SEPARATOR`]
    pub fn contents(&self) -> String {
        self.file_lines.join(LINE_SEPARATOR)
    }

    /// Range covering the whole buffer
    pub fn file_range(&self) -> BufferRange {
        let last_line = self.line_count();
        let last_column = char_len(&self.file_lines[last_line - 1]) + 1;
        BufferRange::from_coords(1, 1, last_line, last_column)
    }

    /// Get the content of a line
    ///
    /// # Errors
    ///
    /// `LineOutOfRange` when `line` is outside `[1, line_count]`.
    pub fn get_line(&self, line: usize) -> ScriptFileResult<&str> {
        self.check_line(line, 1)?;
        Ok(&self.file_lines[line - 1])
    }

    /// Get the fragment of every line intersected by `range`
    ///
    /// The first element is the tail of the start line, interior lines are
    /// returned whole and the last element is the head of the end line. A
    /// single-line range yields one substring.
    pub fn get_lines_in_range(&self, range: &BufferRange) -> ScriptFileResult<Vec<String>> {
        self.validate_range(range)?;

        let start = range.start;
        let end = range.end;
        let lines = (start.line..=end.line)
            .map(|line| {
                let text = &self.file_lines[line - 1];
                let start_column = if line == start.line { start.column } else { 1 };
                let end_column = if line == end.line {
                    end.column
                } else {
                    char_len(text) + 1
                };
                char_slice(text, start_column - 1, end_column - 1).to_string()
            })
            .collect();

        Ok(lines)
    }

    /// Get the text covered by `range`, lines joined with [`LINE_SEPARATOR`]
    pub fn get_text_in_range(&self, range: &BufferRange) -> ScriptFileResult<String> {
        Ok(self.get_lines_in_range(range)?.join(LINE_SEPARATOR))
    }

    /// Check that a position addresses this buffer
    ///
    /// # Errors
    ///
    /// - `LineOutOfRange` when `line` is outside `[1, line_count]`
    /// - `ColumnOutOfRange` when `column` is outside `[1, len(line) + 1]`
    pub fn validate_position(&self, line: usize, column: usize) -> ScriptFileResult<()> {
        self.check_line(line, column)?;

        let max_column = char_len(&self.file_lines[line - 1]) + 1;
        if column < 1 || column > max_column {
            return Err(ScriptFileError::ColumnOutOfRange {
                line,
                column,
                max_column,
            });
        }

        Ok(())
    }

    /// Convert a position into a 0-based character offset
    pub fn get_offset_at_position(&self, line: usize, column: usize) -> ScriptFileResult<usize> {
        self.validate_position(line, column)?;

        let preceding: usize = self.file_lines[..line - 1]
            .iter()
            .map(|text| char_len(text) + LINE_SEPARATOR.len())
            .sum();

        Ok(preceding + column - 1)
    }

    /// Convert a 0-based character offset into a position
    pub fn get_position_at_offset(&self, offset: usize) -> ScriptFileResult<BufferPosition> {
        Ok(self.get_range_between_offsets(offset, offset)?.start)
    }

    /// Convert a pair of 0-based character offsets into a range
    ///
    /// Scans the lines once, tracking the running offset; the first line whose
    /// cumulative length reaches the searched offset holds it. An offset that
    /// lands inside a multi-character separator resolves to the end of the
    /// preceding line.
    pub fn get_range_between_offsets(
        &self,
        start_offset: usize,
        end_offset: usize,
    ) -> ScriptFileResult<BufferRange> {
        if end_offset < start_offset {
            return Err(ScriptFileError::InvertedOffsets {
                start: start_offset,
                end: end_offset,
            });
        }

        let max_offset = self.content_len();
        for offset in [start_offset, end_offset] {
            if offset > max_offset {
                return Err(ScriptFileError::OffsetOutOfRange { offset, max_offset });
            }
        }

        let mut searched = start_offset;
        let mut current = 0;
        let mut start_position = None;
        let mut line = 0;

        while line < self.file_lines.len() {
            let len = char_len(&self.file_lines[line]);

            let column = if searched <= current + len {
                searched - current
            } else if searched < current + len + LINE_SEPARATOR.len() {
                len
            } else {
                current += len + LINE_SEPARATOR.len();
                line += 1;
                continue;
            };

            let position = BufferPosition::new(line + 1, column + 1);
            match start_position {
                Some(start) => return Ok(BufferRange::new(start, position)),
                None if start_offset == end_offset => return Ok(BufferRange::point(position)),
                None => {
                    // The end offset may sit on the same line, so rescan it.
                    start_position = Some(position);
                    searched = end_offset;
                }
            }
        }

        Err(ScriptFileError::OffsetOutOfRange {
            offset: searched,
            max_offset,
        })
    }

    /// Move `origin` by a line and column delta
    ///
    /// The resulting column is clamped to the end of the target line. The
    /// resulting line is never clamped.
    pub fn calculate_position(
        &self,
        origin: BufferPosition,
        line_offset: isize,
        column_offset: isize,
    ) -> ScriptFileResult<BufferPosition> {
        let new_line = origin.line as isize + line_offset;
        let requested_column = origin.column as isize + column_offset;

        if new_line < 1 {
            return Err(ScriptFileError::LineOutOfRange {
                line: 0,
                column: requested_column.max(0) as usize,
                max_line: self.line_count(),
            });
        }

        let new_line = new_line as usize;
        self.check_line(new_line, requested_column.max(0) as usize)?;

        let max_column = char_len(&self.file_lines[new_line - 1]) + 1;
        let new_column = requested_column.min(max_column as isize);
        if new_column < 1 {
            return Err(ScriptFileError::ColumnOutOfRange {
                line: new_line,
                column: 0,
                max_column,
            });
        }

        Ok(BufferPosition::new(new_line, new_column as usize))
    }

    /// Apply a single edit to the buffer
    ///
    /// Covers insert (empty span), replace, delete (empty text) and multi-line
    /// expansion or contraction. A change starting at `line_count + 1` appends
    /// its lines to the buffer; it must sit at column 1 and is a no-op when
    /// it inserts nothing.
    ///
    /// # Errors
    ///
    /// A `ScriptFileError` when either endpoint is outside the buffer or the
    /// span is inverted. Out-of-range spans are never truncated.
    pub fn apply_change(&mut self, change: &FileChange) -> ScriptFileResult<()> {
        let fragments = change.insert_string.split('\n').map(strip_carriage_returns);

        if change.line == self.line_count() + 1 {
            if change.end_line != change.line {
                return Err(ScriptFileError::LineOutOfRange {
                    line: change.end_line,
                    column: change.end_offset,
                    max_line: self.line_count() + 1,
                });
            }
            // The appended line is empty until the edit lands
            for column in [change.offset, change.end_offset] {
                if column != 1 {
                    return Err(ScriptFileError::ColumnOutOfRange {
                        line: change.line,
                        column,
                        max_column: 1,
                    });
                }
            }
            if change.insert_string.is_empty() {
                return Ok(());
            }

            trace!(line = change.line, "appending to script buffer");
            self.file_lines.extend(fragments);
            return Ok(());
        }

        self.validate_position(change.line, change.offset)?;
        self.validate_position(change.end_line, change.end_offset)?;
        if change.end().is_before(&change.start()) {
            return Err(ScriptFileError::InvertedRange {
                start: change.start(),
                end: change.end(),
            });
        }

        let first_line = &self.file_lines[change.line - 1];
        let prefix = char_slice(first_line, 0, change.offset - 1).to_string();
        let last_line = &self.file_lines[change.end_line - 1];
        let suffix = char_slice(last_line, change.end_offset - 1, char_len(last_line)).to_string();

        let mut replacement: Vec<String> = fragments.collect();
        replacement[0].insert_str(0, &prefix);
        if let Some(last) = replacement.last_mut() {
            last.push_str(&suffix);
        }

        trace!(
            start = %change.start(),
            end = %change.end(),
            inserted_lines = replacement.len(),
            "applying change to script buffer"
        );
        self.file_lines
            .splice(change.line - 1..change.end_line, replacement);

        Ok(())
    }

    /// Convert a position counted in `encoding` units to a buffer position
    ///
    /// A column inside a surrogate pair moves past that character. Positions
    /// off the buffer keep their overshoot so validation still reports them.
    pub fn decode_position(
        &self,
        position: BufferPosition,
        encoding: PositionEncoding,
    ) -> BufferPosition {
        let Some(text) = self.encoded_line(position, encoding) else {
            return position;
        };

        let units = position.column - 1;
        let mut consumed = 0;
        let mut chars = 0;
        for c in text.chars() {
            if consumed >= units {
                break;
            }
            consumed += c.len_utf16();
            chars += 1;
        }

        BufferPosition::new(position.line, chars + units.saturating_sub(consumed) + 1)
    }

    /// Convert a buffer position to one counted in `encoding` units
    pub fn encode_position(
        &self,
        position: BufferPosition,
        encoding: PositionEncoding,
    ) -> BufferPosition {
        let Some(text) = self.encoded_line(position, encoding) else {
            return position;
        };

        let chars = position.column - 1;
        let units: usize = text.chars().take(chars).map(char::len_utf16).sum();
        let overshoot = chars.saturating_sub(char_len(text));
        BufferPosition::new(position.line, units + overshoot + 1)
    }

    pub fn encode_range(&self, range: BufferRange, encoding: PositionEncoding) -> BufferRange {
        BufferRange::new(
            self.encode_position(range.start, encoding),
            self.encode_position(range.end, encoding),
        )
    }

    /// Re-express a client edit in buffer columns against the current text
    pub fn decode_change(&self, change: &FileChange, encoding: PositionEncoding) -> FileChange {
        FileChange::replace(
            self.decode_position(change.start(), encoding),
            self.decode_position(change.end(), encoding),
            change.insert_string.clone(),
        )
    }

    /// Line text when `position` needs converting between units
    fn encoded_line(&self, position: BufferPosition, encoding: PositionEncoding) -> Option<&str> {
        if encoding == PositionEncoding::Utf32 || position.line == 0 || position.column == 0 {
            return None;
        }
        self.file_lines.get(position.line - 1).map(String::as_str)
    }

    /// Replace the whole buffer
    pub fn set_file_contents(&mut self, text: &str) {
        self.file_lines = split_lines(text);
    }

    /// Range of the identifier touching `position`, if any
    ///
    /// Identifier characters are alphanumerics and `_ @ # $`.
    pub fn word_range_at(&self, position: BufferPosition) -> ScriptFileResult<Option<BufferRange>> {
        self.validate_position(position.line, position.column)?;

        let chars: Vec<char> = self.file_lines[position.line - 1].chars().collect();
        let cursor = position.column - 1;

        let mut start = cursor;
        while start > 0 && is_word_char(chars[start - 1]) {
            start -= 1;
        }
        let mut end = cursor;
        while end < chars.len() && is_word_char(chars[end]) {
            end += 1;
        }

        if start == end {
            return Ok(None);
        }

        Ok(Some(BufferRange::from_coords(
            position.line,
            start + 1,
            position.line,
            end + 1,
        )))
    }

    /// Bind a position to this file
    pub fn position(&self, position: BufferPosition) -> ScriptFileResult<FilePosition<'_>> {
        self.validate_position(position.line, position.column)?;
        Ok(FilePosition {
            file: self,
            position,
        })
    }

    fn check_line(&self, line: usize, column: usize) -> ScriptFileResult<()> {
        let max_line = self.line_count();
        if line < 1 || line > max_line {
            return Err(ScriptFileError::LineOutOfRange {
                line,
                column,
                max_line,
            });
        }
        Ok(())
    }

    fn validate_range(&self, range: &BufferRange) -> ScriptFileResult<()> {
        self.validate_position(range.start.line, range.start.column)?;
        self.validate_position(range.end.line, range.end.column)?;
        if range.end.is_before(&range.start) {
            return Err(ScriptFileError::InvertedRange {
                start: range.start,
                end: range.end,
            });
        }
        Ok(())
    }

    /// Length of the flattened buffer in characters
    fn content_len(&self) -> usize {
        let text: usize = self.file_lines.iter().map(|line| char_len(line)).sum();
        text + (self.file_lines.len() - 1) * LINE_SEPARATOR.len()
    }
}

/// A position bound to a specific script file
#[derive(Debug, Clone, Copy)]
pub struct FilePosition<'a> {
    file: &'a ScriptFile,
    position: BufferPosition,
}

impl<'a> FilePosition<'a> {
    pub fn position(&self) -> BufferPosition {
        self.position
    }

    /// Move by a line and column delta within the same file
    pub fn add_offset(&self, line_offset: isize, column_offset: isize) -> ScriptFileResult<Self> {
        let position = self
            .file
            .calculate_position(self.position, line_offset, column_offset)?;
        Ok(Self {
            file: self.file,
            position,
        })
    }

    /// First non-whitespace character of the line
    pub fn line_start(&self) -> Self {
        let text = &self.file.file_lines[self.position.line - 1];
        let indent = text.chars().take_while(|c| c.is_whitespace()).count();
        Self {
            file: self.file,
            position: BufferPosition::new(self.position.line, indent + 1),
        }
    }

    /// Insert position after the last character of the line
    pub fn line_end(&self) -> Self {
        let text = &self.file.file_lines[self.position.line - 1];
        Self {
            file: self.file,
            position: BufferPosition::new(self.position.line, char_len(text) + 1),
        }
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(strip_carriage_returns).collect()
}

fn strip_carriage_returns(line: &str) -> String {
    line.trim_end_matches('\r').to_string()
}

/// Characters that make up a T-SQL identifier or variable name
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$')
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(index, _)| index)
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    &text[byte_index(text, start)..byte_index(text, end)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_FIXTURE: &str = "SELECT * FROM sys.objects as o1\r\n\
                                 SELECT * FROM sys.objects as o2\r\n\
                                 SELECT * FROM sys.objects as o3";

    fn create_test_file(text: &str) -> ScriptFile {
        ScriptFile::new("test.sql", "file:///test.sql", text)
    }

    fn joined(lines: &[&str]) -> String {
        lines.join(LINE_SEPARATOR)
    }

    #[test]
    fn test_lines_are_split_and_stripped() {
        let file = create_test_file("first\r\nsecond\nthird\r\r\n");
        assert_eq!(file.file_lines(), &["first", "second", "third", ""]);
        assert_eq!(file.line_count(), 4);
    }

    #[test]
    fn test_empty_text_has_one_line() {
        let file = create_test_file("");
        assert_eq!(file.line_count(), 1);
        assert_eq!(file.file_range(), BufferRange::from_coords(1, 1, 1, 1));
        assert!(file.validate_position(1, 1).is_ok());
    }

    #[test]
    fn test_get_line() {
        let file = create_test_file(QUERY_FIXTURE);
        assert_eq!(file.get_line(2).unwrap(), "SELECT * FROM sys.objects as o2");
        assert!(matches!(
            file.get_line(0),
            Err(ScriptFileError::LineOutOfRange { max_line: 3, .. })
        ));
        assert!(file.get_line(4).is_err());
    }

    #[test]
    fn test_validate_position_boundaries() {
        let file = create_test_file("abc\r\nde");

        assert!(file.validate_position(1, 1).is_ok());
        assert!(file.validate_position(1, 4).is_ok());
        assert!(file.validate_position(2, 3).is_ok());

        assert!(matches!(
            file.validate_position(1, 0),
            Err(ScriptFileError::ColumnOutOfRange { max_column: 4, .. })
        ));
        assert!(matches!(
            file.validate_position(1, 5),
            Err(ScriptFileError::ColumnOutOfRange { .. })
        ));
        assert!(matches!(
            file.validate_position(0, 1),
            Err(ScriptFileError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            file.validate_position(4, 1),
            Err(ScriptFileError::LineOutOfRange { .. })
        ));
        // Queries never accept the append line
        assert!(file.validate_position(3, 1).is_err());
    }

    #[test]
    fn test_offset_at_position_fixture() {
        let file = create_test_file(QUERY_FIXTURE);

        let offset = file.get_offset_at_position(2, 5).unwrap();
        assert_eq!(offset, 35 + LINE_SEPARATOR.len());

        let position = file.get_position_at_offset(offset).unwrap();
        assert_eq!(position, BufferPosition::new(2, 5));
    }

    #[test]
    fn test_offset_round_trip_over_every_position() {
        let file = create_test_file("SELECT a,\n  b\n\nFROM tbl ünï");

        for line in 1..=file.line_count() {
            let max_column = file.get_line(line).unwrap().chars().count() + 1;
            for column in 1..=max_column {
                let offset = file.get_offset_at_position(line, column).unwrap();
                let position = file.get_position_at_offset(offset).unwrap();
                assert_eq!(position, BufferPosition::new(line, column));
            }
        }
    }

    #[test]
    fn test_offset_past_end_is_rejected() {
        let file = create_test_file("ab\ncd");
        let end = 2 + LINE_SEPARATOR.len() + 2;

        assert_eq!(
            file.get_position_at_offset(end).unwrap(),
            BufferPosition::new(2, 3)
        );
        assert!(matches!(
            file.get_position_at_offset(end + 1),
            Err(ScriptFileError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_range_between_offsets() {
        let file = create_test_file("SELECT *\nFROM users");

        let start = file.get_offset_at_position(1, 8).unwrap();
        let end = file.get_offset_at_position(2, 5).unwrap();
        let range = file.get_range_between_offsets(start, end).unwrap();
        assert_eq!(range, BufferRange::from_coords(1, 8, 2, 5));

        let same_line = file.get_range_between_offsets(0, 6).unwrap();
        assert_eq!(same_line, BufferRange::from_coords(1, 1, 1, 7));

        let point = file.get_range_between_offsets(3, 3).unwrap();
        assert!(!point.has_range());
    }

    #[test]
    fn test_get_lines_in_range() {
        let file = create_test_file("SELECT id,\n  name\nFROM users");

        let single = file
            .get_lines_in_range(&BufferRange::from_coords(1, 8, 1, 10))
            .unwrap();
        assert_eq!(single, vec!["id"]);

        let multi = file
            .get_lines_in_range(&BufferRange::from_coords(1, 8, 3, 5))
            .unwrap();
        assert_eq!(multi, vec!["id,", "  name", "FROM"]);

        let text = file
            .get_text_in_range(&BufferRange::from_coords(1, 8, 3, 5))
            .unwrap();
        assert_eq!(text, joined(&["id,", "  name", "FROM"]));
    }

    #[test]
    fn test_get_lines_in_range_rejects_bad_endpoints() {
        let file = create_test_file("abc\ndef");

        assert!(
            file.get_lines_in_range(&BufferRange::from_coords(1, 1, 3, 1))
                .is_err()
        );
        assert!(
            file.get_lines_in_range(&BufferRange::from_coords(1, 5, 2, 1))
                .is_err()
        );
        assert!(matches!(
            file.get_lines_in_range(&BufferRange::from_coords(2, 1, 1, 1)),
            Err(ScriptFileError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_calculate_position_clamps_column_only() {
        let file = create_test_file("SELECT *\nFROM t\nWHERE x = 1");
        let origin = BufferPosition::new(1, 8);

        let next = file.calculate_position(origin, 1, 0).unwrap();
        assert_eq!(next, BufferPosition::new(2, 7));

        let moved = file.calculate_position(origin, 2, -3).unwrap();
        assert_eq!(moved, BufferPosition::new(3, 5));

        assert!(matches!(
            file.calculate_position(origin, 3, 0),
            Err(ScriptFileError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            file.calculate_position(origin, -1, 0),
            Err(ScriptFileError::LineOutOfRange { .. })
        ));
        assert!(matches!(
            file.calculate_position(origin, 0, -8),
            Err(ScriptFileError::ColumnOutOfRange { .. })
        ));
    }

    #[test]
    fn test_apply_change_multi_line_insert() {
        let mut file = create_test_file("first\r\nsecond\r\nfifth");

        file.apply_change(&FileChange {
            line: 3,
            offset: 1,
            end_line: 3,
            end_offset: 1,
            insert_string: "third\r\nfourth\r\n".to_string(),
        })
        .unwrap();

        assert_eq!(
            file.file_lines(),
            &["first", "second", "third", "fourth", "fifth"]
        );
        assert_eq!(
            file.contents(),
            "first\r\nsecond\r\nthird\r\nfourth\r\nfifth".replace("\r\n", LINE_SEPARATOR)
        );
    }

    #[test]
    fn test_apply_change_single_line_replace() {
        let mut file = create_test_file("SELECT * FROM users");
        file.apply_change(&FileChange::replace(
            BufferPosition::new(1, 8),
            BufferPosition::new(1, 9),
            "id",
        ))
        .unwrap();
        assert_eq!(file.contents(), "SELECT id FROM users");
    }

    #[test]
    fn test_apply_change_multi_line_contraction() {
        let mut file = create_test_file("SELECT a,\n  b,\n  c\nFROM t");
        file.apply_change(&FileChange::replace(
            BufferPosition::new(1, 9),
            BufferPosition::new(3, 4),
            ", z",
        ))
        .unwrap();
        assert_eq!(file.file_lines(), &["SELECT a, z", "FROM t"]);
    }

    #[test]
    fn test_apply_change_delete_and_restore_line() {
        let original = create_test_file("one\ntwo\nthree");

        for line in 1..original.line_count() {
            let mut file = original.clone();
            let line_len = file.get_line(line).unwrap().chars().count();
            let next_len = file.get_line(line + 1).unwrap().chars().count();
            let removed = file.get_line(line + 1).unwrap().to_string();

            // Remove the following line and its separator
            file.apply_change(&FileChange::delete(
                BufferPosition::new(line, line_len + 1),
                BufferPosition::new(line + 1, next_len + 1),
            ))
            .unwrap();
            assert_eq!(file.line_count(), original.line_count() - 1);

            file.apply_change(&FileChange::insert(
                BufferPosition::new(line, line_len + 1),
                format!("\n{removed}"),
            ))
            .unwrap();
            assert_eq!(file, original);
        }
    }

    #[test]
    fn test_apply_change_appends_after_last_line() {
        let mut file = create_test_file("SELECT 1");
        file.apply_change(&FileChange::insert(BufferPosition::new(2, 1), "GO\r\nSELECT 2"))
            .unwrap();
        assert_eq!(file.file_lines(), &["SELECT 1", "GO", "SELECT 2"]);
    }

    #[test]
    fn test_apply_change_empty_append_is_noop() {
        let mut file = create_test_file("SELECT 1");
        file.apply_change(&FileChange::insert(BufferPosition::new(2, 1), ""))
            .unwrap();
        assert_eq!(file.file_lines(), &["SELECT 1"]);
    }

    #[test]
    fn test_apply_change_append_requires_first_column() {
        let mut file = create_test_file("SELECT 1");
        let before = file.clone();

        let result = file.apply_change(&FileChange::insert(BufferPosition::new(2, 99), "x"));
        assert_eq!(
            result,
            Err(ScriptFileError::ColumnOutOfRange {
                line: 2,
                column: 99,
                max_column: 1,
            })
        );
        assert!(result.unwrap_err().is_out_of_range());

        let result = file.apply_change(&FileChange::replace(
            BufferPosition::new(2, 1),
            BufferPosition::new(2, 3),
            "x",
        ));
        assert!(matches!(
            result,
            Err(ScriptFileError::ColumnOutOfRange { column: 3, .. })
        ));
        assert_eq!(file, before);
    }

    #[test]
    fn test_inverted_range_is_not_out_of_range() {
        let file = create_test_file("SELECT 1");
        let err = file
            .get_text_in_range(&BufferRange::from_coords(1, 5, 1, 2))
            .unwrap_err();
        assert!(matches!(err, ScriptFileError::InvertedRange { .. }));
        assert!(!err.is_out_of_range());
    }

    #[test]
    fn test_apply_change_rejects_out_of_range_end() {
        let mut file = create_test_file("SELECT *\nFROM t");
        let before = file.clone();

        let result = file.apply_change(&FileChange::replace(
            BufferPosition::new(1, 1),
            BufferPosition::new(5, 1),
            "x",
        ));
        assert!(matches!(
            result,
            Err(ScriptFileError::LineOutOfRange { line: 5, .. })
        ));
        assert_eq!(file, before);

        let append_overrun = file.apply_change(&FileChange::replace(
            BufferPosition::new(3, 1),
            BufferPosition::new(4, 1),
            "x",
        ));
        assert!(append_overrun.is_err());
        assert_eq!(file, before);
    }

    #[test]
    fn test_utf16_positions_skip_surrogate_pairs() {
        // U+1F600 takes two UTF-16 units
        let file = create_test_file("-- \u{1F600} note\nSELECT é");

        let decoded = file.decode_position(BufferPosition::new(1, 6), PositionEncoding::Utf16);
        assert_eq!(decoded, BufferPosition::new(1, 5));
        assert_eq!(
            file.encode_position(decoded, PositionEncoding::Utf16),
            BufferPosition::new(1, 6)
        );

        // Inside the pair moves past the emoji
        assert_eq!(
            file.decode_position(BufferPosition::new(1, 5), PositionEncoding::Utf16),
            BufferPosition::new(1, 5)
        );
        // BMP characters count the same in both units
        assert_eq!(
            file.decode_position(BufferPosition::new(2, 9), PositionEncoding::Utf16),
            BufferPosition::new(2, 9)
        );
    }

    #[test]
    fn test_decode_keeps_out_of_range_columns() {
        let file = create_test_file("\u{1F600}");
        let past_end = file.decode_position(BufferPosition::new(1, 6), PositionEncoding::Utf16);
        assert_eq!(past_end, BufferPosition::new(1, 5));
        assert!(file.validate_position(past_end.line, past_end.column).is_err());

        let off_buffer = BufferPosition::new(4, 3);
        assert_eq!(file.decode_position(off_buffer, PositionEncoding::Utf16), off_buffer);
        assert_eq!(
            file.decode_position(BufferPosition::new(1, 3), PositionEncoding::Utf32),
            BufferPosition::new(1, 3)
        );
    }

    #[test]
    fn test_decode_change_then_apply() {
        let mut file = create_test_file("/* \u{1F600} */ SELECT x");
        // UTF-16 columns 17..18 cover the `x`
        let change = FileChange::replace(
            BufferPosition::new(1, 17),
            BufferPosition::new(1, 18),
            "id",
        );
        let decoded = file.decode_change(&change, PositionEncoding::Utf16);
        file.apply_change(&decoded).unwrap();
        assert_eq!(file.get_line(1).unwrap(), "/* \u{1F600} */ SELECT id");
    }

    #[test]
    fn test_set_file_contents() {
        let mut file = create_test_file("old");
        file.set_file_contents("new\r\ncontent");
        assert_eq!(file.file_lines(), &["new", "content"]);
    }

    #[test]
    fn test_word_range_at() {
        let file = create_test_file("SELECT @user_id FROM dbo.users");

        let range = file.word_range_at(BufferPosition::new(1, 10)).unwrap();
        assert_eq!(range, Some(BufferRange::from_coords(1, 8, 1, 16)));

        // Cursor right after the word still touches it
        let range = file.word_range_at(BufferPosition::new(1, 7)).unwrap();
        assert_eq!(range, Some(BufferRange::from_coords(1, 1, 1, 7)));

        let range = file.word_range_at(BufferPosition::new(1, 25)).unwrap();
        assert_eq!(range, Some(BufferRange::from_coords(1, 22, 1, 25)));
    }

    #[test]
    fn test_file_position_navigation() {
        let file = create_test_file("SELECT *\n    FROM t");
        let position = file.position(BufferPosition::new(2, 7)).unwrap();

        assert_eq!(position.line_start().position(), BufferPosition::new(2, 5));
        assert_eq!(position.line_end().position(), BufferPosition::new(2, 11));

        let up = position.add_offset(-1, 10).unwrap();
        assert_eq!(up.position(), BufferPosition::new(1, 9));
    }

    #[test]
    fn test_from_reader() {
        let reader = std::io::Cursor::new("SELECT 1\r\nGO");
        let file = ScriptFile::from_reader("/tmp/a.sql", "file:///tmp/a.sql", reader).unwrap();
        assert_eq!(file.file_lines(), &["SELECT 1", "GO"]);
        assert!(!file.is_in_memory());
        assert!(file.is_analysis_enabled());
    }
}
