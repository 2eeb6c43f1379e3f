//! # CodeIndex
//!
//! A multi-language code indexing and retrieval engine exposing an MCP
//! (JSON-RPC over stdio) tool surface to coding assistants: symbol lookup,
//! ranked full-text search with BM25, and an optional dense-vector semantic
//! side-index, kept current by a file watcher.
//!
//! ## Architecture
//!
//! The crate is organized following Domain-Driven Design principles:
//!
//! - `domain`: models (languages, symbols, configuration), pure services
//!   (query construction, snippets, export filtering), and the error taxonomy
//! - `application`: ports and use cases (indexing, lookup, search, export,
//!   semantic side-index)
//! - `connector`: external integrations (SQLite storage, tree-sitter,
//!   embedding provider, vector store, file watcher, MCP transport)

pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

// Re-export commonly used types
pub use application::*;
pub use connector::*;
pub use domain::*;
