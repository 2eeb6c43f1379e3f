use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language tags known to the registry.
///
/// `Plaintext` is the universal fallback: every readable file that no other
/// tag claims is still indexed for content search under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Cpp,
    Php,
    Dockerfile,
    Makefile,
    Dotenv,
    Plaintext,
}

impl Language {
    /// Detect a language for a path. Filename rules win over extension rules;
    /// everything else falls back to `Plaintext`.
    pub fn detect(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if let Some(lang) = Self::from_file_name(file_name) {
            return lang;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Plaintext)
    }

    /// Extensionless filenames and name patterns.
    fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "Dockerfile" => return Some(Language::Dockerfile),
            "Makefile" | "makefile" | "GNUmakefile" => return Some(Language::Makefile),
            _ => {}
        }
        if name == ".env" || name.starts_with(".env.") || name.ends_with(".env") {
            return Some(Language::Dotenv);
        }
        if name.ends_with(".key") || name.ends_with(".pem") {
            return Some(Language::Plaintext);
        }
        None
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "c" | "h" | "cc" | "cpp" | "hpp" | "cxx" => Language::Cpp,
            "php" => Language::Php,
            "env" => Language::Dotenv,
            _ => Language::Plaintext,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" => Language::Go,
            "cpp" => Language::Cpp,
            "php" => Language::Php,
            "dockerfile" => Language::Dockerfile,
            "makefile" => Language::Makefile,
            "dotenv" => Language::Dotenv,
            _ => Language::Plaintext,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::Dockerfile => "dockerfile",
            Language::Makefile => "makefile",
            Language::Dotenv => "dotenv",
            Language::Plaintext => "plaintext",
        }
    }

    /// Whether a tree-sitter grammar backs this tag.
    pub fn has_grammar(&self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::Python
                | Language::JavaScript
                | Language::TypeScript
                | Language::Go
                | Language::Cpp
                | Language::Php
        )
    }

    /// Line-comment prefix used for doc extraction.
    pub fn line_comment_prefix(&self) -> Option<&'static str> {
        match self {
            Language::Rust => Some("//"),
            Language::Python => Some("#"),
            Language::JavaScript | Language::TypeScript => Some("//"),
            Language::Go => Some("//"),
            Language::Cpp => Some("//"),
            Language::Php => Some("//"),
            Language::Dockerfile | Language::Makefile | Language::Dotenv => Some("#"),
            Language::Plaintext => None,
        }
    }

    /// Block-comment delimiter pair, where the language has one.
    pub fn block_comment(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Language::JavaScript
            | Language::TypeScript
            | Language::Go
            | Language::Cpp
            | Language::Php
            | Language::Rust => Some(("/*", "*/")),
            _ => None,
        }
    }

    pub fn grammar_languages() -> &'static [Language] {
        &[
            Language::Rust,
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Go,
            Language::Cpp,
            Language::Php,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
