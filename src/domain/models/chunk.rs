use serde::{Deserialize, Serialize};

use super::Language;

/// Maximum lines per semantic chunk.
pub const MAX_CHUNK_LINES: usize = 1_000;

/// A contiguous slice of one file destined for the semantic side-index.
/// `(file_path, chunk_index)` is stable across re-chunks of identical content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub file_path: String,
    pub chunk_index: u32,
    pub byte_start: usize,
    pub byte_end: usize,
    pub language: Language,
    pub content: String,
}

/// Split file content into chunks of at most [`MAX_CHUNK_LINES`] lines,
/// preferring to break at the last blank line inside the window.
pub fn chunk_content(path: &str, language: Language, content: &str) -> Vec<SemanticChunk> {
    if content.is_empty() {
        return Vec::new();
    }

    // Byte offset of the start of every line.
    let mut line_starts = vec![0usize];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' && i + 1 < content.len() {
            line_starts.push(i + 1);
        }
    }
    let total_lines = line_starts.len();

    let line_end = |line: usize| -> usize {
        if line + 1 < total_lines {
            line_starts[line + 1]
        } else {
            content.len()
        }
    };
    let is_blank = |line: usize| -> bool {
        content[line_starts[line]..line_end(line)].trim().is_empty()
    };

    let mut chunks = Vec::new();
    let mut start_line = 0usize;

    while start_line < total_lines {
        let hard_end = (start_line + MAX_CHUNK_LINES).min(total_lines);

        let mut end_line = hard_end;
        if hard_end < total_lines {
            // Prefer the last blank line in the window, keeping chunks non-empty.
            if let Some(blank) = (start_line + 1..hard_end).rev().find(|&l| is_blank(l)) {
                end_line = blank + 1;
            }
        }

        let byte_start = line_starts[start_line];
        let byte_end = line_end(end_line - 1);
        let text = &content[byte_start..byte_end];

        if !text.trim().is_empty() {
            chunks.push(SemanticChunk {
                file_path: path.to_string(),
                chunk_index: chunks.len() as u32,
                byte_start,
                byte_end,
                language,
                content: text.to_string(),
            });
        }

        start_line = end_line;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_file_is_one_chunk() {
        let chunks = chunk_content("a.rs", Language::Rust, "fn main() {}\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].byte_start, 0);
    }

    #[test]
    fn test_large_file_splits_at_blank_lines() {
        let mut content = String::new();
        for i in 0..1_500 {
            content.push_str(&format!("line {}\n", i));
            if i % 100 == 99 {
                content.push('\n');
            }
        }
        let chunks = chunk_content("big.py", Language::Python, &content);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.content.lines().count() <= MAX_CHUNK_LINES);
        }
        // Chunks tile the file without overlap.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].byte_end, pair[1].byte_start);
        }
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        assert!(chunk_content("e.txt", Language::Plaintext, "").is_empty());
    }

    #[test]
    fn test_chunk_indices_are_sequential() {
        let content = "a\n".repeat(2_500);
        let chunks = chunk_content("seq.txt", Language::Plaintext, &content);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index as usize, i);
        }
    }
}
