use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use searxng_mcp_core::SearchBackend;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod dispatch;
mod envelope;

pub(crate) use dispatch::{AdvancedSearchArgs, CategorySearchArgs, SearchArgs, ToolOutcome};

fn tool_result(outcome: ToolOutcome) -> CallToolResult {
    // Structured content for machine consumers; the text block carries the rendering
    // for clients that only read `content[0].text`.
    let mut r = if outcome.ok {
        CallToolResult::structured(outcome.payload)
    } else {
        CallToolResult::structured_error(outcome.payload)
    };
    r.content = vec![Content::text(outcome.text)];
    r
}

#[derive(Clone)]
pub(crate) struct SearxngMcp {
    tool_router: RmcpToolRouter<Self>,
    backend: Arc<dyn SearchBackend>,
}

#[tool_router]
impl SearxngMcp {
    pub(crate) fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            backend,
        }
    }

    #[tool(
        description = "Search the web using SearXNG in the general category. Returns up to 10 ranked results (title, url, summary, published date) plus the backend's total result count. format: json (default) or text."
    )]
    async fn search(
        &self,
        params: Parameters<Option<SearchArgs>>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(
            dispatch::run(self.backend.as_ref(), &args, &ctx.ct).await,
        ))
    }

    #[tool(
        description = "Search the web using SearXNG restricted to specific categories. Available categories: general, images, videos, news, map, music, it, science, files, social media. Every category must be valid or the call fails without searching."
    )]
    async fn search_category(
        &self,
        params: Parameters<Option<CategorySearchArgs>>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(
            dispatch::run(self.backend.as_ref(), &args, &ctx.ct).await,
        ))
    }

    #[tool(
        description = "Search the web using SearXNG with advanced options: language code (e.g. en, fr), time_range (day, month, year), and page (1-50). Searches the general category."
    )]
    async fn search_advanced(
        &self,
        params: Parameters<Option<AdvancedSearchArgs>>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(
            dispatch::run(self.backend.as_ref(), &args, &ctx.ct).await,
        ))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SearxngMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Web search through a SearXNG instance. One backend call per tool call; results are capped at 10 and schema-versioned."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the three search tools over stdio until the client disconnects or `shutdown`
/// fires. Cancelling `shutdown` also cancels every in-flight tool call.
pub(crate) async fn serve_stdio(
    backend: Arc<dyn SearchBackend>,
    shutdown: CancellationToken,
) -> Result<(), McpError> {
    let svc = SearxngMcp::new(backend);
    let running = svc
        .serve_with_ct(stdio(), shutdown)
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    tracing::info!("mcp stdio server ready");
    let reason = running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    tracing::info!(?reason, "mcp stdio server stopped");
    Ok(())
}

/// One-shot invocation of a tool pipeline outside MCP (used by the `search` subcommand).
pub(crate) async fn run_search_once<R: dispatch::ToolRequest>(
    backend: &dyn SearchBackend,
    req: &R,
    shutdown: &CancellationToken,
) -> ToolOutcome {
    dispatch::run(backend, req, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use searxng_mcp_core::{Category, Query, ResultSet, TimeRange};
    use std::collections::BTreeSet;

    struct NullBackend;

    #[async_trait::async_trait]
    impl SearchBackend for NullBackend {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn search(&self, q: &Query) -> searxng_mcp_core::Result<ResultSet> {
            Ok(ResultSet {
                query: q.text.clone(),
                number_of_results: 0,
                results: vec![],
            })
        }
    }

    fn server() -> SearxngMcp {
        SearxngMcp::new(Arc::new(NullBackend))
    }

    #[test]
    fn exposes_exactly_three_search_tools() {
        let names: BTreeSet<String> = server()
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.into_owned())
            .collect();
        let want: BTreeSet<String> = ["search", "search_category", "search_advanced"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(names, want);
    }

    #[test]
    fn descriptions_stay_in_sync_with_vocabularies() {
        let tools = server().tool_router.list_all();
        let desc = |name: &str| -> String {
            tools
                .iter()
                .find(|t| t.name == name)
                .and_then(|t| t.description.clone())
                .map(|d| d.into_owned())
                .unwrap_or_default()
        };
        let cat = desc("search_category");
        for name in Category::names() {
            assert!(cat.contains(name), "search_category description missing {name}");
        }
        let adv = desc("search_advanced");
        for name in TimeRange::names() {
            assert!(adv.contains(name), "search_advanced description missing {name}");
        }
        assert!(adv.contains(&format!("{}-{}", Query::DEFAULT_PAGE, Query::MAX_PAGE)));
    }

    #[test]
    fn category_schema_enumerates_every_category() {
        let tools = server().tool_router.list_all();
        let t = tools
            .iter()
            .find(|t| t.name == "search_category")
            .expect("search_category");
        let schema = serde_json::Value::Object((*t.input_schema).clone());
        let s = schema.to_string();
        for name in Category::names() {
            assert!(s.contains(&format!("\"{name}\"")), "schema missing {name}");
        }
    }

    #[test]
    fn failed_outcome_sets_is_error_and_text() {
        let r = tool_result(ToolOutcome {
            ok: false,
            payload: serde_json::json!({"ok": false}),
            text: "Error: nope".to_string(),
        });
        assert_eq!(r.is_error, Some(true));
        assert_eq!(
            r.content.first().and_then(|c| c.as_text()).map(|t| t.text.as_str()),
            Some("Error: nope")
        );
        assert_eq!(
            r.structured_content.as_ref().and_then(|v| v["ok"].as_bool()),
            Some(false)
        );
    }

    #[test]
    fn ok_outcome_is_not_error() {
        let r = tool_result(ToolOutcome {
            ok: true,
            payload: serde_json::json!({"ok": true, "total": 0}),
            text: "{}".to_string(),
        });
        assert_ne!(r.is_error, Some(true));
        assert!(r.structured_content.is_some());
    }
}
