use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Index the workspace (or a given repository root)
    Index {
        /// Repository root to index; defaults to the detected workspace
        path: Option<String>,

        /// Disable all language plugins (content search only)
        #[arg(long)]
        no_plugins: bool,
    },

    /// Search indexed file contents
    Search {
        query: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Route through the semantic side-index when configured
        #[arg(short, long)]
        semantic: bool,
    },

    /// Look up the definition of a symbol by name
    Lookup {
        symbol: String,
    },

    /// List recorded references to a symbol
    Refs {
        symbol: String,
    },

    /// Show index statistics
    Status,

    /// Produce a filtered, shareable index archive
    Export {
        /// Output archive path (defaults to <fingerprint>-index.tar.gz)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Watch the workspace and keep the index current
    Watch,

    /// Start the MCP (Model Context Protocol) server on stdio
    Mcp,
}
