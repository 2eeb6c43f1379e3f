use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::transport::stdio;
use rmcp::ErrorData as McpError;
use rmcp::ServerHandler;
use rmcp::ServiceExt;
use rmcp::{tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::connector::api::Engine;
use crate::domain::{SearchQuery, DEFAULT_LIMIT, MAX_LIMIT};

use super::tools::{ReindexOutput, SearchHitOutput, SymbolLookupOutput};

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Input for the symbol_lookup tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SymbolLookupInput {
    /// Exact symbol name; falls back to fuzzy matching on a miss
    pub symbol: String,
}

/// Input for the search_code tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchCodeInput {
    /// Query string; tokens are AND-combined, `*` enables prefix matching
    pub query: String,

    /// Route through the semantic side-index when available
    #[serde(default)]
    pub semantic: bool,

    /// Maximum number of results (default 20, server cap 100)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Input for the reindex tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReindexInput {
    /// Restrict the re-index to one repo-relative path
    pub path: Option<String>,
}

/// MCP server exposing the engine over JSON-RPC on stdio.
#[derive(Clone)]
pub struct CodeIndexMcpServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CodeIndexMcpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    /// Look up the single best definition of a symbol by name. Exact matches
    /// win; otherwise close names are matched fuzzily.
    #[tool(name = "symbol_lookup")]
    async fn symbol_lookup(
        &self,
        params: Parameters<SymbolLookupInput>,
    ) -> Result<CallToolResult, McpError> {
        let hit = self
            .engine
            .lookup(&params.0.symbol)
            .await
            .map_err(|e| McpError::internal_error(format!("Lookup failed: {}", e), None))?;

        let Some(hit) = hit else {
            // A miss is empty content, not an error.
            return Ok(CallToolResult::success(vec![]));
        };

        let output = SymbolLookupOutput {
            symbol: hit.symbol,
            kind: hit.kind,
            language: hit.language,
            defined_in: hit.defined_in,
            line: hit.line,
            signature: hit.signature,
            doc: hit.doc,
        };
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| McpError::internal_error(format!("Serialization failed: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    /// Search file contents across the indexed repository. Returns ranked
    /// hits with highlighted snippets; set `semantic` for embedding-based
    /// retrieval when the side-index is configured.
    #[tool(name = "search_code")]
    async fn search_code(
        &self,
        params: Parameters<SearchCodeInput>,
    ) -> Result<CallToolResult, McpError> {
        let input = params.0;
        let query = SearchQuery::new(&input.query)
            .with_semantic(input.semantic)
            .with_limit(input.limit.min(MAX_LIMIT));

        let hits = self.engine.search(query).await.map_err(|e| {
            if e.is_bad_query() {
                McpError::invalid_params(format!("{}", e), None)
            } else {
                McpError::internal_error(format!("Search failed: {}", e), None)
            }
        })?;

        let outputs: Vec<SearchHitOutput> = hits
            .into_iter()
            .map(|h| SearchHitOutput {
                file: h.file,
                line: h.line,
                snippet: h.snippet,
                score: h.score,
                language: h.language,
                rerank_score: h.rerank_score,
            })
            .collect();
        let json = serde_json::to_string_pretty(&outputs)
            .map_err(|e| McpError::internal_error(format!("Serialization failed: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    /// Report index location, row counts, language histogram, last index
    /// time, and whether the semantic side-index is enabled.
    #[tool(name = "get_status")]
    async fn get_status(&self) -> Result<CallToolResult, McpError> {
        let status = self
            .engine
            .status()
            .await
            .map_err(|e| McpError::internal_error(format!("Status failed: {}", e), None))?;
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(format!("Serialization failed: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    /// Re-index the workspace, or a single path when given. Returns counts;
    /// per-file failures never abort the run.
    #[tool(name = "reindex")]
    async fn reindex(&self, params: Parameters<ReindexInput>) -> Result<CallToolResult, McpError> {
        let path = params.0.path.map(std::path::PathBuf::from);
        let report = self
            .engine
            .reindex(path.as_deref(), None)
            .await
            .map_err(|e| McpError::internal_error(format!("Reindex failed: {}", e), None))?;

        let output = ReindexOutput {
            indexed: report.indexed,
            failed: report.failed.len() as u64,
        };
        let json = serde_json::to_string_pretty(&output)
            .map_err(|e| McpError::internal_error(format!("Serialization failed: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

#[tool_handler]
impl ServerHandler for CodeIndexMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Code index server. Use search_code for ranked full-text (or semantic) search \
                 over repository contents, symbol_lookup to resolve a definition by name, \
                 get_status for index statistics, and reindex to refresh the index."
                    .into(),
            ),
        }
    }
}

/// Serve the engine over stdio until the client disconnects.
pub async fn serve_stdio(engine: Arc<Engine>) -> anyhow::Result<()> {
    let server = CodeIndexMcpServer::new(engine);
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("MCP serve error: {e}"))?;
    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP runtime error: {e}"))?;
    Ok(())
}
