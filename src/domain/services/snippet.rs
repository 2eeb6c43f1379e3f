/// Tokens of context kept on each side of the strongest match.
pub const SNIPPET_CONTEXT_TOKENS: usize = 20;

/// Locate the 1-indexed line of the first occurrence of any query token,
/// case-insensitively. Falls back to line 1 when nothing matches (e.g. the
/// match came from the filepath column).
pub fn first_match_line(content: &str, tokens: &[String]) -> u32 {
    if tokens.is_empty() {
        return 1;
    }
    let needles: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    for (i, line) in content.lines().enumerate() {
        let lower = line.to_lowercase();
        if needles.iter().any(|n| !n.is_empty() && lower.contains(n.as_str())) {
            return (i + 1) as u32;
        }
    }
    1
}

/// Split a raw query into the bare terms used for highlighting: passthrough
/// syntax characters are stripped so `tok*` highlights `tok`.
pub fn highlight_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Build a highlighted excerpt around the strongest match: up to
/// [`SNIPPET_CONTEXT_TOKENS`] whitespace tokens of context on each side,
/// matched tokens wrapped in the configured delimiters, `…` marking
/// truncation. Used for hits that did not come out of the FTS engine (the
/// FTS path gets its snippet from the engine's own snippet function).
pub fn make_snippet(content: &str, terms: &[String], delimiters: (char, char)) -> String {
    let (open, close) = delimiters;
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let lower_terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    let matches_term = |word: &str| -> bool {
        let lower = word.to_lowercase();
        lower_terms.iter().any(|t| !t.is_empty() && lower.contains(t.as_str()))
    };

    let anchor = words.iter().position(|w| matches_term(w)).unwrap_or(0);
    let start = anchor.saturating_sub(SNIPPET_CONTEXT_TOKENS);
    let end = (anchor + SNIPPET_CONTEXT_TOKENS + 1).min(words.len());

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    for (i, word) in words[start..end].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if matches_term(word) {
            out.push(open);
            out.push_str(word);
            out.push(close);
        } else {
            out.push_str(word);
        }
    }
    if end < words.len() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_line_finds_token() {
        let content = "fn main() {\n    let widget = 1;\n}\n";
        assert_eq!(first_match_line(content, &["widget".to_string()]), 2);
    }

    #[test]
    fn test_first_match_line_defaults_to_one() {
        assert_eq!(first_match_line("no hits here", &["absent".to_string()]), 1);
    }

    #[test]
    fn test_highlight_terms_strip_syntax() {
        assert_eq!(highlight_terms("tok* (paint)"), vec!["tok", "paint"]);
    }

    #[test]
    fn test_make_snippet_wraps_matches() {
        let snippet = make_snippet(
            "the quick brown fox jumps",
            &["fox".to_string()],
            ('«', '»'),
        );
        assert!(snippet.contains("«fox»"));
        assert!(!snippet.contains('…'));
    }

    #[test]
    fn test_make_snippet_truncates_long_content() {
        let content = (0..200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let snippet = make_snippet(&content, &["w100".to_string()], ('«', '»'));
        assert!(snippet.starts_with('…'));
        assert!(snippet.ends_with('…'));
        assert!(snippet.contains("«w100»"));
    }
}
