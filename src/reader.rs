//! Line-oriented access to a playlist byte stream.

use std::io::Read;

use crate::error::{Error, Result};

/// Buffers a playlist byte stream as a sequence of trimmed, non-empty text
/// lines.
///
/// The stream is decoded as UTF-8 (stray bytes are replaced, they can only
/// ever occur in pass-through text), a leading byte-order mark is stripped,
/// and the mandatory `#EXTM3U` header is validated up front. This is the only
/// place where "looks like garbage input" is distinguished from "valid
/// header, malformed body"; everything after the header produces tag-specific
/// errors instead.
///
/// Already-consumed lines can be pushed back for re-dispatch. Pushed-back
/// lines are replayed LIFO, so a caller replaying several lines pushes them
/// in reverse order.
pub struct LineReader {
    lines: std::vec::IntoIter<String>,
    pushed_back: Vec<String>,
}

const HEADER: &str = "#EXTM3U";

impl LineReader {
    /// Reads `input` to completion and validates the playlist header.
    pub fn new<R: Read>(mut input: R) -> Result<LineReader> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        LineReader::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<LineReader> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let body = check_header(text)?;
        let lines: Vec<String> = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Ok(LineReader {
            lines: lines.into_iter(),
            pushed_back: Vec::new(),
        })
    }

    /// Next line, preferring pushed-back lines.
    pub fn next_line(&mut self) -> Option<String> {
        self.pushed_back.pop().or_else(|| self.lines.next())
    }

    pub fn peek_line(&mut self) -> Option<&str> {
        if self.pushed_back.is_empty() {
            let line = self.lines.next()?;
            self.pushed_back.push(line);
        }
        self.pushed_back.last().map(String::as_str)
    }

    pub fn push_back(&mut self, line: String) {
        self.pushed_back.push(line);
    }
}

/// Verifies that the first non-whitespace content is the `#EXTM3U` literal
/// and that the rest of the header line is blank. Returns the remainder of
/// the text after the header line.
fn check_header(text: &str) -> Result<&str> {
    let text = text.trim_start();
    let rest = match text.strip_prefix(HEADER) {
        Some(rest) => rest,
        None => return Err(Error::Unrecognized),
    };
    let line_end = rest.find('\n').unwrap_or(rest.len());
    if !rest[..line_end].chars().all(char::is_whitespace) {
        return Err(Error::Unrecognized);
    }
    Ok(&rest[line_end..])
}
