use serde::{Deserialize, Serialize};

use super::Language;

/// Symbol kinds emitted by the parser adapters.
///
/// The capture vocabulary of the definition queries maps one-to-one onto
/// these; unknown capture names are ignored by the extraction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Function,
    Method,
    Variable,
    Constant,
    Interface,
    Type,
    Enum,
    Struct,
    Module,
    Field,
    Parameter,
    Macro,
    Trait,
    Package,
    Namespace,
    Symbol,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Struct => "struct",
            SymbolKind::Module => "module",
            SymbolKind::Field => "field",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Macro => "macro",
            SymbolKind::Trait => "trait",
            SymbolKind::Package => "package",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Symbol => "symbol",
        }
    }

    pub fn parse(s: &str) -> Self {
        Self::from_capture(s).unwrap_or(SymbolKind::Symbol)
    }

    /// Map a query capture name to a kind. Capture names outside the fixed
    /// vocabulary return `None` and are skipped.
    pub fn from_capture(capture: &str) -> Option<Self> {
        match capture {
            "class" => Some(SymbolKind::Class),
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "variable" => Some(SymbolKind::Variable),
            "constant" => Some(SymbolKind::Constant),
            "interface" => Some(SymbolKind::Interface),
            "type" => Some(SymbolKind::Type),
            "enum" => Some(SymbolKind::Enum),
            "struct" => Some(SymbolKind::Struct),
            "module" => Some(SymbolKind::Module),
            "field" => Some(SymbolKind::Field),
            "parameter" => Some(SymbolKind::Parameter),
            "macro" => Some(SymbolKind::Macro),
            "trait" => Some(SymbolKind::Trait),
            "package" => Some(SymbolKind::Package),
            "namespace" => Some(SymbolKind::Namespace),
            "symbol" => Some(SymbolKind::Symbol),
            _ => None,
        }
    }

    /// Lookup tie-break priority: class > function > method > struct >
    /// interface > type > variable > everything else. Lower is better.
    pub fn priority(&self) -> u8 {
        match self {
            SymbolKind::Class => 0,
            SymbolKind::Function => 1,
            SymbolKind::Method => 2,
            SymbolKind::Struct => 3,
            SymbolKind::Interface => 4,
            SymbolKind::Type => 5,
            SymbolKind::Variable => 6,
            _ => 7,
        }
    }

    /// Kinds that can contain other definitions; a symbol whose parent has
    /// one of these kinds and whose own kind is `Function` is a method.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Enum
        )
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A definition extracted from one file. Positions are 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// First source line of the definition, trimmed to 200 characters.
    pub signature: String,
    /// Immediately preceding contiguous run of comment lines, if any.
    pub doc: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub column: u32,
    /// Name of the enclosing definition for nested symbols.
    pub parent: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: String::new(),
            doc: None,
            start_line,
            end_line,
            column: 0,
            parent: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = column;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Reference kinds persisted alongside symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Call,
    Import,
    Inherit,
    Use,
    Other,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Call => "call",
            ReferenceKind::Import => "import",
            ReferenceKind::Inherit => "inherit",
            ReferenceKind::Use => "use",
            ReferenceKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "call" => ReferenceKind::Call,
            "import" => ReferenceKind::Import,
            "inherit" => ReferenceKind::Inherit,
            "use" => ReferenceKind::Use,
            _ => ReferenceKind::Other,
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A use site captured at parse time. The target symbol is resolved by name
/// at persist time and may stay unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub line: u32,
    pub column: u32,
    pub kind: ReferenceKind,
}

impl Reference {
    pub fn new(name: impl Into<String>, line: u32, column: u32, kind: ReferenceKind) -> Self {
        Self {
            name: name.into(),
            line,
            column,
            kind,
        }
    }
}

/// The in-memory result of parsing one file, handed from a plugin to the
/// storage engine.
#[derive(Debug, Clone)]
pub struct IndexShard {
    pub path: String,
    pub language: Language,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
}

impl IndexShard {
    pub fn empty(path: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            language,
            symbols: Vec::new(),
            references: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_vocabulary() {
        assert_eq!(SymbolKind::from_capture("function"), Some(SymbolKind::Function));
        assert_eq!(SymbolKind::from_capture("trait"), Some(SymbolKind::Trait));
        assert_eq!(SymbolKind::from_capture("impl"), None);
        assert_eq!(SymbolKind::from_capture("name"), None);
    }

    #[test]
    fn test_kind_priority_ordering() {
        assert!(SymbolKind::Class.priority() < SymbolKind::Function.priority());
        assert!(SymbolKind::Function.priority() < SymbolKind::Method.priority());
        assert!(SymbolKind::Variable.priority() < SymbolKind::Macro.priority());
    }

    #[test]
    fn test_symbol_builder() {
        let sym = Symbol::new("Widget", SymbolKind::Class, 1, 4)
            .with_signature("class Widget:")
            .with_doc("A paintable widget.");

        assert_eq!(sym.name, "Widget");
        assert_eq!(sym.signature, "class Widget:");
        assert_eq!(sym.doc.as_deref(), Some("A paintable widget."));
        assert!(sym.parent.is_none());
    }

    #[test]
    fn test_reference_kind_roundtrip() {
        for kind in [
            ReferenceKind::Call,
            ReferenceKind::Import,
            ReferenceKind::Inherit,
            ReferenceKind::Use,
            ReferenceKind::Other,
        ] {
            assert_eq!(ReferenceKind::parse(kind.as_str()), kind);
        }
    }
}
