//! Tree-sitter symbol extraction: one definition query and one reference
//! query per grammar-backed language, captures drawn from the fixed
//! vocabulary understood by the core.

use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::domain::{IndexShard, Language, Reference, ReferenceKind, Symbol, SymbolKind};

/// Signatures are the first source line of a definition, capped here.
const MAX_SIGNATURE_CHARS: usize = 200;

pub struct TreeSitterSymbolParser;

impl TreeSitterSymbolParser {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(&self, language: Language) -> bool {
        language.has_grammar()
    }

    /// Parse `content` and extract definitions plus references. Languages
    /// without a grammar, and files the grammar cannot parse, yield an empty
    /// shard; content search still covers them.
    pub fn extract(&self, path: &str, content: &str, language: Language) -> IndexShard {
        let Some(ts_language) = get_ts_language(language) else {
            return IndexShard::empty(path, language);
        };

        let mut parser = Parser::new();
        if parser.set_language(&ts_language).is_err() {
            warn!("Grammar rejected for {}; skipping symbols", language);
            return IndexShard::empty(path, language);
        }
        let Some(tree) = parser.parse(content, None) else {
            debug!("Parse failed for {}; skipping symbols", path);
            return IndexShard::empty(path, language);
        };

        let mut symbols = run_definition_query(&ts_language, language, tree.root_node(), content);
        assign_parents(&mut symbols);

        let references = run_reference_query(&ts_language, language, tree.root_node(), content);

        IndexShard {
            path: path.to_string(),
            language,
            symbols,
            references,
        }
    }
}

impl Default for TreeSitterSymbolParser {
    fn default() -> Self {
        Self::new()
    }
}

fn get_ts_language(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
        _ => None,
    }
}

fn definition_query(language: Language) -> &'static str {
    match language {
        Language::Rust => {
            r#"
            (function_item name: (identifier) @name) @function
            (struct_item name: (type_identifier) @name) @struct
            (enum_item name: (type_identifier) @name) @enum
            (trait_item name: (type_identifier) @name) @trait
            (mod_item name: (identifier) @name) @module
            (const_item name: (identifier) @name) @constant
            (static_item name: (identifier) @name) @constant
            (type_item name: (type_identifier) @name) @type
            (macro_definition name: (identifier) @name) @macro
            (field_declaration name: (field_identifier) @name) @field
            "#
        }
        Language::Python => {
            r#"
            (function_definition name: (identifier) @name) @function
            (class_definition name: (identifier) @name) @class
            "#
        }
        Language::JavaScript => {
            r#"
            (function_declaration name: (identifier) @name) @function
            (class_declaration name: (identifier) @name) @class
            (method_definition name: (property_identifier) @name) @method
            "#
        }
        Language::TypeScript => {
            r#"
            (function_declaration name: (identifier) @name) @function
            (class_declaration name: (type_identifier) @name) @class
            (method_definition name: (property_identifier) @name) @method
            (interface_declaration name: (type_identifier) @name) @interface
            (type_alias_declaration name: (type_identifier) @name) @type
            (enum_declaration name: (identifier) @name) @enum
            "#
        }
        Language::Go => {
            r#"
            (function_declaration name: (identifier) @name) @function
            (method_declaration name: (field_identifier) @name) @method
            (type_declaration (type_spec name: (type_identifier) @name type: (struct_type))) @struct
            (type_declaration (type_spec name: (type_identifier) @name type: (interface_type))) @interface
            (const_declaration (const_spec name: (identifier) @name)) @constant
            (package_clause (package_identifier) @name) @package
            "#
        }
        Language::Cpp => {
            r#"
            (class_specifier name: (type_identifier) @name) @class
            (struct_specifier name: (type_identifier) @name) @struct
            (function_definition
              declarator: (function_declarator declarator: (identifier) @name)) @function
            (function_definition
              declarator: (function_declarator declarator: (field_identifier) @name)) @method
            (enum_specifier name: (type_identifier) @name) @enum
            (namespace_definition name: (namespace_identifier) @name) @namespace
            (type_definition declarator: (type_identifier) @name) @type
            (preproc_def name: (identifier) @name) @macro
            "#
        }
        Language::Php => {
            r#"
            (function_definition name: (name) @name) @function
            (method_declaration name: (name) @name) @method
            (class_declaration name: (name) @name) @class
            (interface_declaration name: (name) @name) @interface
            (trait_declaration name: (name) @name) @trait
            (enum_declaration name: (name) @name) @enum
            (namespace_definition name: (namespace_name) @name) @namespace
            "#
        }
        _ => "",
    }
}

fn reference_query(language: Language) -> &'static str {
    match language {
        Language::Rust => {
            r#"
            (call_expression function: (identifier) @target) @call
            (call_expression
              function: (field_expression field: (field_identifier) @target)) @call
            (call_expression
              function: (scoped_identifier name: (identifier) @target)) @call
            (macro_invocation macro: (identifier) @target) @call
            (use_declaration argument: (scoped_identifier name: (identifier) @target)) @import
            (use_declaration argument: (identifier) @target) @import
            (struct_expression name: (type_identifier) @target) @use
            "#
        }
        Language::Python => {
            r#"
            (call function: (identifier) @target) @call
            (call function: (attribute attribute: (identifier) @target)) @call
            (import_statement name: (dotted_name (identifier) @target)) @import
            (import_from_statement name: (dotted_name (identifier) @target)) @import
            (class_definition
              superclasses: (argument_list (identifier) @target)) @inherit
            "#
        }
        Language::JavaScript => {
            r#"
            (call_expression function: (identifier) @target) @call
            (call_expression
              function: (member_expression property: (property_identifier) @target)) @call
            (new_expression constructor: (identifier) @target) @use
            (import_statement (import_clause (identifier) @target)) @import
            (import_statement
              (import_clause (named_imports (import_specifier name: (identifier) @target)))) @import
            (class_heritage (identifier) @target) @inherit
            "#
        }
        Language::TypeScript => {
            r#"
            (call_expression function: (identifier) @target) @call
            (call_expression
              function: (member_expression property: (property_identifier) @target)) @call
            (new_expression constructor: (identifier) @target) @use
            (import_statement (import_clause (identifier) @target)) @import
            (import_statement
              (import_clause (named_imports (import_specifier name: (identifier) @target)))) @import
            "#
        }
        Language::Go => {
            r#"
            (call_expression function: (identifier) @target) @call
            (call_expression
              function: (selector_expression field: (field_identifier) @target)) @call
            (import_spec path: (interpreted_string_literal) @target) @import
            "#
        }
        Language::Cpp => {
            r#"
            (call_expression function: (identifier) @target) @call
            (call_expression
              function: (field_expression field: (field_identifier) @target)) @call
            (preproc_include path: (_) @target) @import
            (base_class_clause (type_identifier) @target) @inherit
            "#
        }
        Language::Php => {
            r#"
            (function_call_expression function: (name) @target) @call
            (member_call_expression name: (name) @target) @call
            (object_creation_expression (name) @target) @use
            (base_clause (name) @target) @inherit
            "#
        }
        _ => "",
    }
}

fn run_definition_query(
    ts_language: &tree_sitter::Language,
    language: Language,
    root: Node<'_>,
    content: &str,
) -> Vec<Symbol> {
    let source = definition_query(language);
    if source.is_empty() {
        return Vec::new();
    }
    let query = match Query::new(ts_language, source) {
        Ok(q) => q,
        Err(e) => {
            warn!("Definition query failed to compile for {}: {}", language, e);
            return Vec::new();
        }
    };

    let capture_names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, root, content.as_bytes());

    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();

    while let Some(m) = matches.next() {
        let mut name: Option<String> = None;
        let mut kind: Option<SymbolKind> = None;
        let mut node: Option<Node<'_>> = None;
        let mut name_column = 0u32;

        for capture in m.captures {
            let capture_name = capture_names[capture.index as usize];
            if capture_name == "name" {
                name = capture
                    .node
                    .utf8_text(content.as_bytes())
                    .ok()
                    .map(str::to_string);
                name_column = capture.node.start_position().column as u32 + 1;
            } else if let Some(mapped) = SymbolKind::from_capture(capture_name) {
                kind = Some(mapped);
                node = Some(capture.node);
            }
        }

        let (Some(name), Some(kind), Some(node)) = (name, kind, node) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let signature = node
            .utf8_text(content.as_bytes())
            .ok()
            .and_then(|t| t.lines().next())
            .map(|l| truncate_chars(l.trim_end(), MAX_SIGNATURE_CHARS))
            .unwrap_or_default();

        let mut symbol = Symbol::new(trim_quotes(&name), kind, start_line, end_line)
            .with_signature(signature)
            .with_column(name_column);
        if let Some(doc) = leading_doc(&lines, start_line, language) {
            symbol = symbol.with_doc(doc);
        }
        symbols.push(symbol);
    }

    symbols.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });
    symbols
}

fn run_reference_query(
    ts_language: &tree_sitter::Language,
    language: Language,
    root: Node<'_>,
    content: &str,
) -> Vec<Reference> {
    let source = reference_query(language);
    if source.is_empty() {
        return Vec::new();
    }
    let query = match Query::new(ts_language, source) {
        Ok(q) => q,
        Err(e) => {
            // Grammar drift: live without references rather than fail the file.
            debug!("Reference query failed to compile for {}: {}", language, e);
            return Vec::new();
        }
    };

    let capture_names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, root, content.as_bytes());
    let mut references = Vec::new();

    while let Some(m) = matches.next() {
        let mut target: Option<(String, u32, u32)> = None;
        let mut kind = ReferenceKind::Other;

        for capture in m.captures {
            let capture_name = capture_names[capture.index as usize];
            match capture_name {
                "target" => {
                    if let Ok(text) = capture.node.utf8_text(content.as_bytes()) {
                        target = Some((
                            trim_quotes(text),
                            capture.node.start_position().row as u32 + 1,
                            capture.node.start_position().column as u32 + 1,
                        ));
                    }
                }
                "call" => kind = ReferenceKind::Call,
                "import" => kind = ReferenceKind::Import,
                "inherit" => kind = ReferenceKind::Inherit,
                "use" => kind = ReferenceKind::Use,
                _ => {}
            }
        }

        if let Some((name, line, column)) = target {
            if !name.is_empty() {
                references.push(Reference::new(name, line, column, kind));
            }
        }
    }

    references
}

/// Collect the contiguous run of comment lines immediately above a
/// definition, stripped of the language's line-comment prefix.
fn leading_doc(lines: &[&str], start_line: u32, language: Language) -> Option<String> {
    let prefix = language.line_comment_prefix()?;
    let mut doc_lines: Vec<&str> = Vec::new();

    let mut row = (start_line as usize).checked_sub(2)?;
    loop {
        let trimmed = lines.get(row)?.trim_start();
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            // Doc markers stack on the plain prefix (`///`, `//!`, `##`).
            let rest = rest
                .trim_start_matches(|c: char| prefix.contains(c) || c == '!')
                .trim();
            doc_lines.push(rest);
        } else {
            break;
        }
        if row == 0 {
            break;
        }
        row -= 1;
    }

    if doc_lines.is_empty() {
        return None;
    }
    doc_lines.reverse();
    Some(doc_lines.join("\n").trim().to_string())
}

/// Assign parents by range containment and reclassify functions nested in
/// container kinds as methods.
fn assign_parents(symbols: &mut [Symbol]) {
    let ranges: Vec<(String, SymbolKind, u32, u32)> = symbols
        .iter()
        .map(|s| (s.name.clone(), s.kind, s.start_line, s.end_line))
        .collect();

    for symbol in symbols.iter_mut() {
        let enclosing = ranges
            .iter()
            .filter(|(name, _, start, end)| {
                *start <= symbol.start_line
                    && *end >= symbol.end_line
                    && !(*start == symbol.start_line && *end == symbol.end_line)
                    && name != &symbol.name
            })
            .max_by_key(|(_, _, start, _)| *start);

        if let Some((name, kind, _, _)) = enclosing {
            symbol.parent = Some(name.clone());
            if symbol.kind == SymbolKind::Function && kind.is_container() {
                symbol.kind = SymbolKind::Method;
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn trim_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>')
        .to_string()
}
