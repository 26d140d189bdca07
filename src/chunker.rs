//! Line-based chunking with overlap.
//!
//! Chunk boundaries depend only on `(text, max_lines, overlap)`, which keeps
//! per-chunk record ids stable across re-embeddings of unchanged files.

use crate::error::{AppError, AppResult};

/// One chunk of a file together with its true position in that file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub index: usize,
    /// Verbatim lines, trailing newlines included.
    pub text: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
}

/// Reject parameter combinations that would never terminate.
pub fn validate_params(max_lines: usize, overlap: usize) -> AppResult<()> {
    if max_lines == 0 || overlap >= max_lines {
        return Err(AppError::InvalidChunking { max_lines, overlap });
    }
    Ok(())
}

/// Split `text` into overlapping blocks of at most `max_lines` lines.
pub fn chunk_code(text: &str, max_lines: usize, overlap: usize) -> AppResult<Vec<String>> {
    Ok(chunk_lines(text, max_lines, overlap)?
        .into_iter()
        .map(|c| c.text)
        .collect())
}

/// Like [`chunk_code`], but keeps each block's line range.
///
/// Block `i + 1` starts `overlap` lines before the end of block `i`. The
/// last block ends exactly at the last line of the text; no trailing empty
/// or duplicate block is produced.
pub fn chunk_lines(text: &str, max_lines: usize, overlap: usize) -> AppResult<Vec<CodeChunk>> {
    validate_params(max_lines, overlap)?;

    let lines = split_lines(text);
    let total = lines.len();
    let mut chunks = Vec::with_capacity(total / (max_lines - overlap) + 1);

    let mut start = 0usize;
    while start < total {
        let end = (start + max_lines).min(total);
        chunks.push(CodeChunk {
            index: chunks.len(),
            text: lines[start..end].concat(),
            start_line: start + 1,
            end_line: end,
        });
        if end == total {
            break;
        }
        start = end - overlap;
    }

    Ok(chunks)
}

/// Split after every line terminator (`\n`, `\r\n` or a bare `\r`),
/// keeping the terminator with its line.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let end = match bytes[i] {
            b'\n' => i + 1,
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => i + 2,
            b'\r' => i + 1,
            _ => {
                i += 1;
                continue;
            }
        };
        lines.push(&text[start..end]);
        start = end;
        i = end;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}
