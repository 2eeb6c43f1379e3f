use crate::domain::EngineError;

/// Identifier shape that triggers filename-column boosting.
fn looks_like_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    let rest: Vec<char> = chars.collect();
    rest.len() >= 2 && rest.iter().all(|c| c.is_ascii_alphanumeric() || *c == '_')
}

/// Characters that switch a token to verbatim passthrough, supporting the
/// FTS engine's phrase and prefix syntax.
fn has_passthrough_char(token: &str) -> bool {
    token.contains('"') || token.contains('*') || token.contains('(') || token.contains(')')
}

/// Build an FTS MATCH expression from a raw user query.
///
/// Whitespace-separated tokens are AND-combined. Tokens carrying phrase or
/// prefix syntax pass through verbatim; identifier-like tokens are duplicated
/// against the filename column so that files named after the query rank
/// higher. Queries with no searchable content at all are `BadQuery`.
pub fn build_match_expr(query: &str) -> Result<String, EngineError> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(EngineError::bad_query("empty query"));
    }

    if !tokens
        .iter()
        .any(|t| t.chars().any(|c| c.is_alphanumeric()))
    {
        return Err(EngineError::bad_query(format!(
            "query contains only reserved characters: {}",
            query
        )));
    }

    let mut parts = Vec::with_capacity(tokens.len());
    for token in tokens {
        if has_passthrough_char(token) {
            parts.push(token.to_string());
        } else if looks_like_identifier(token) {
            parts.push(format!("({token} OR filename:{token})"));
        } else {
            // Quote so punctuation inside the token cannot break the grammar.
            parts.push(format!("\"{}\"", token.replace('"', "\"\"")));
        }
    }

    // Space-joined terms are implicitly AND-combined by the FTS engine, and
    // joining with plain spaces keeps quoted phrases intact across tokens.
    Ok(parts.join(" "))
}
