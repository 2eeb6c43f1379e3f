use thiserror::Error;

/// Error taxonomy for every public engine operation.
///
/// Usage errors (`BadQuery`, `InvalidInput`, `UnknownTool`) are returned to the
/// caller and never fatal. Structural errors (`OpenFailed`, `SchemaMismatch`)
/// fail the operation but leave the process up; `reindex` is the recovery path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Bad query: {0}")]
    BadQuery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to open index: {0}")]
    OpenFailed(String),

    #[error("Schema version mismatch: artifact is v{found}, engine supports up to v{supported}")]
    SchemaMismatch { found: i64, supported: i64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Deadline elapsed after {completed} items")]
    Timeout { completed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn bad_query(msg: impl Into<String>) -> Self {
        Self::BadQuery(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_bad_query(&self) -> bool {
        matches!(self, Self::BadQuery(_))
    }

    /// Structural failures that surface as exit code 4 from the CLI.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::OpenFailed(_) | Self::SchemaMismatch { .. })
    }
}
