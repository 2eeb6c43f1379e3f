//! Plaintext fallback: no symbols, except `.env`-style files where each
//! `KEY=value` line becomes a `variable` so local lookups can find it.

use crate::domain::{IndexShard, Language, Symbol, SymbolKind};

pub struct PlainTextParser;

impl PlainTextParser {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, path: &str, content: &str, language: Language) -> IndexShard {
        let mut shard = IndexShard::empty(path, language);
        if language != Language::Dotenv {
            return shard;
        }

        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }
            let Some((key, _)) = trimmed.split_once('=') else {
                continue;
            };
            // Tolerate `export KEY=...` shells use.
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() || !is_env_key(key) {
                continue;
            }

            let line_no = i as u32 + 1;
            let column = (line.len() - trimmed.len()) as u32 + 1;
            shard.symbols.push(
                Symbol::new(key, SymbolKind::Variable, line_no, line_no)
                    .with_signature(truncate(line.trim_end(), 200))
                    .with_column(column),
            );
        }
        shard
    }
}

impl Default for PlainTextParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
