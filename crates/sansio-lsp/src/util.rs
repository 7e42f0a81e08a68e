//! Small helpers around documents and file URIs.

use std::path::{Path, PathBuf};

use lsp_types::{Position, Range, TextDocumentContentChangeEvent, Url};

/// Builds an incremental change event for the replacement of
/// `start..end` with `text`.
///
/// `old_text` must be the document content *before* this change; when
/// batching several changes into one `didChange`, that means the state
/// after all previous changes in the batch. The deprecated
/// `rangeLength` is filled in because some servers still read it.
pub fn range_change(
    start: Position,
    end: Position,
    text: impl Into<String>,
    old_text: &str,
) -> TextDocumentContentChangeEvent {
    let range = Range { start, end };
    TextDocumentContentChangeEvent {
        range_length: Some(range_length(old_text, &range)),
        range: Some(range),
        text: text.into(),
    }
}

/// Builds a change event replacing the whole document.
pub fn whole_document_change(text: impl Into<String>) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: None,
        range_length: None,
        text: text.into(),
    }
}

/// The length of `range` within `old_text`, in characters.
///
/// Within one line this is the span between the two columns; across
/// lines it is the remainder of the start line, every interior line in
/// full, and the prefix of the end line. Line terminators themselves
/// are not counted.
pub fn range_length(old_text: &str, range: &Range) -> u32 {
    let lines = split_lines(old_text);
    let line_at = |idx: u32| lines.get(idx as usize).copied().unwrap_or("");
    let start = &range.start;
    let end = &range.end;

    let total = if start.line == end.line {
        line_at(start.line)
            .chars()
            .skip(start.character as usize)
            .take((end.character.saturating_sub(start.character)) as usize)
            .count()
    } else {
        let head = line_at(start.line)
            .chars()
            .skip(start.character as usize)
            .count();
        let middle: usize = (start.line + 1..end.line)
            .map(|idx| line_at(idx).chars().count())
            .sum();
        let tail = line_at(end.line)
            .chars()
            .take(end.character as usize)
            .count();
        head + middle + tail
    };
    total as u32
}

/// Splits on `\n`, `\r\n` and `\r` alike, dropping the terminators.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Converts an absolute path to a `file://` URI.
///
/// On Windows the result carries the RFC 8089 form with a leading `/`
/// before the drive letter (`file:///C:/...`). Relative paths have no
/// URI form and yield `None`.
pub fn uri_from_path(path: &Path) -> Option<Url> {
    Url::from_file_path(path).ok()
}

/// Converts a `file://` URI back to a path. Non-file URIs yield `None`.
pub fn path_from_uri(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}
