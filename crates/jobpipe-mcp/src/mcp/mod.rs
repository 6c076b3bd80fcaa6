use jobpipe_core::params::unwrap_legacy;
use jobpipe_core::resolve::{self, Resolution, TriggerMatch};
use jobpipe_core::walk::{self, TreeWalk, DEFAULT_MAX_DEPTH};
use jobpipe_core::{BuildParams, Error, JenkinsApi, JobPath, KindFilter, RequestContext};
use jobpipe_jenkins::JenkinsClient;
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

mod envelope;
mod prompts;
use envelope::*;

pub(crate) const SCHEMA_VERSION: u64 = 1;

/// Upper bound on caller-supplied traversal depth.
const MAX_DEPTH_LIMIT: usize = 50;

fn tool_result(payload: serde_json::Value) -> CallToolResult {
    // Structured content for machine consumers, plus a text copy for clients that only
    // read `content[0].text`.
    let mut r = CallToolResult::structured(payload.clone());
    r.content = vec![Content::text(payload.to_string())];
    r
}

fn merge(payload: &mut serde_json::Value, v: &impl Serialize) {
    if let Ok(serde_json::Value::Object(m)) = serde_json::to_value(v) {
        for (k, v) in m {
            payload[k] = v;
        }
    }
}

fn require_path(raw: Option<&str>) -> Result<JobPath, Error> {
    match raw {
        Some(s) => JobPath::parse(s),
        None => Err(Error::InvalidParams("path is required".to_string())),
    }
}

fn require_build_number(n: Option<u64>) -> Result<u64, Error> {
    n.ok_or_else(|| Error::InvalidParams("build_number is required".to_string()))
}

/// Requested depth, capped. The flag reports whether the cap applied.
fn depth(requested: Option<usize>) -> (usize, bool) {
    let d = requested.unwrap_or(DEFAULT_MAX_DEPTH);
    (d.min(MAX_DEPTH_LIMIT), d > MAX_DEPTH_LIMIT)
}

fn failed_subtrees(tree_failures: &[walk::SubtreeFailure]) -> serde_json::Value {
    serde_json::json!(tree_failures)
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct TriggerJobArgs {
    /// Job path; use `/` between folder levels (e.g. "team/backend/deploy").
    #[serde(default, alias = "job_name")]
    path: Option<String>,
    /// Build parameters. Lists are sent comma-joined; booleans as "true"/"false".
    #[serde(default)]
    params: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct JobInfoArgs {
    #[serde(default, alias = "job_name")]
    path: Option<String>,
    /// On a 404, search the tree and return candidates (default: true).
    #[serde(default)]
    auto_search: Option<bool>,
    /// Depth bound for the fallback search (default: 10).
    #[serde(default)]
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct BuildArgs {
    #[serde(default, alias = "job_name")]
    path: Option<String>,
    #[serde(default)]
    build_number: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct ConsoleLogArgs {
    #[serde(default, alias = "job_name")]
    path: Option<String>,
    #[serde(default)]
    build_number: Option<u64>,
    /// Byte offset to read from (default: 0). Use the previous `size` to continue.
    #[serde(default)]
    start: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct ListJobsArgs {
    /// Descend into folders (default: true). When false only the top level is listed.
    #[serde(default)]
    recursive: Option<bool>,
    #[serde(default)]
    max_depth: Option<usize>,
    /// Include folder entries themselves (default: false).
    #[serde(default)]
    include_folders: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct FolderInfoArgs {
    #[serde(default, alias = "folder")]
    path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct SearchJobsArgs {
    /// Case-insensitive glob: `*` any run, `?` one character.
    #[serde(default)]
    pattern: Option<String>,
    /// job (default), folder, or all.
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
struct SearchAndTriggerArgs {
    /// Must match exactly one job; nothing is triggered otherwise.
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    params: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    max_depth: Option<usize>,
}

#[derive(Clone)]
pub(crate) struct JobpipeMcp {
    tool_router: RmcpToolRouter<Self>,
    jenkins: Arc<JenkinsClient>,
}

#[tool_router]
impl JobpipeMcp {
    pub(crate) fn new() -> Result<Self, McpError> {
        let client = JenkinsClient::from_env()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(Self::with_client(client))
    }

    pub(crate) fn with_client(client: JenkinsClient) -> Self {
        Self {
            tool_router: Self::tool_router(),
            jenkins: Arc::new(client),
        }
    }

    fn api(&self) -> &dyn JenkinsApi {
        self.jenkins.as_ref()
    }

    fn begin(kind: &str) -> (RequestContext, Instant) {
        let ctx = RequestContext::new();
        tracing::info!(request_id = %ctx.request_id(), tool = kind, "tool call");
        (ctx, Instant::now())
    }

    fn finish(
        mut payload: serde_json::Value,
        kind: &str,
        ctx: &RequestContext,
        t0: Instant,
    ) -> Result<CallToolResult, McpError> {
        add_envelope_fields(&mut payload, kind, ctx, t0.elapsed().as_millis());
        Ok(tool_result(payload))
    }

    fn fail(
        e: &Error,
        request: serde_json::Value,
        kind: &str,
        ctx: &RequestContext,
        t0: Instant,
    ) -> Result<CallToolResult, McpError> {
        tracing::warn!(request_id = %ctx.request_id(), tool = kind, error = %e, "tool call failed");
        let payload = serde_json::json!({
            "ok": false,
            "request": request,
            "error": error_obj_from(e),
        });
        Self::finish(payload, kind, ctx, t0)
    }

    fn prepare_params(
        raw: Option<BTreeMap<String, serde_json::Value>>,
        warnings: &mut Vec<&'static str>,
    ) -> BuildParams {
        let raw = raw.unwrap_or_default();
        let legacy = raw
            .get("args")
            .and_then(|a| a.get("params"))
            .is_some_and(serde_json::Value::is_object);
        if legacy {
            warnings.push("legacy_params_unwrapped");
        }
        unwrap_legacy(raw)
    }

    #[tool(
        description = "Trigger a Jenkins build. Without params uses /build, with params /buildWithParameters. Lists become comma-joined values."
    )]
    async fn trigger_job(
        &self,
        params: Parameters<Option<TriggerJobArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("trigger_job");
        let args = params.0.unwrap_or_default();
        let mut warnings = Vec::new();
        let build_params = Self::prepare_params(args.params, &mut warnings);
        let request = serde_json::json!({ "path": args.path, "params": build_params });

        let path = match require_path(args.path.as_deref()) {
            Ok(p) => p,
            Err(e) => return Self::fail(&e, request, "trigger_job", &ctx, t0),
        };
        match self.api().trigger_job(&ctx, &path, &build_params).await {
            Ok(outcome) => {
                let mut payload = serde_json::json!({ "ok": true, "request": request });
                merge(&mut payload, &outcome);
                set_warnings(&mut payload, &warnings);
                Self::finish(payload, "trigger_job", &ctx, t0)
            }
            Err(e) => Self::fail(&e, request, "trigger_job", &ctx, t0),
        }
    }

    #[tool(
        description = "Get job metadata (parameters, last build number). On a 404 with auto_search=true, returns ranked candidates and suggested next calls instead."
    )]
    async fn get_job_info(
        &self,
        params: Parameters<Option<JobInfoArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("get_job_info");
        let args = params.0.unwrap_or_default();
        let auto_search = args.auto_search.unwrap_or(true);
        let (max_depth, capped) = depth(args.max_depth);
        let request = serde_json::json!({
            "path": args.path,
            "auto_search": auto_search,
            "max_depth": max_depth,
        });

        let path = match require_path(args.path.as_deref()) {
            Ok(p) => p,
            Err(e) => return Self::fail(&e, request, "get_job_info", &ctx, t0),
        };
        let mut warnings = Vec::new();
        if capped {
            warnings.push("max_depth_capped");
        }
        let resolution =
            match resolve::resolve_info(self.api(), &ctx, &path, auto_search, max_depth).await {
                Ok(r) => r,
                Err(e) => return Self::fail(&e, request, "get_job_info", &ctx, t0),
            };

        let mut payload = match resolution {
            Resolution::Found(info) => {
                let mut payload = serde_json::json!({ "ok": true, "request": request });
                merge(&mut payload, &info);
                payload
            }
            Resolution::NotFound(miss) => {
                if !miss.failures.is_empty() {
                    warnings.push("subtree_fetch_failed");
                }
                let hint = if miss.search_results.is_empty() {
                    "No similar jobs found. Try the suggested broader search or a full listing."
                } else {
                    "Similar jobs exist. Retry with the exact path from the first suggestion."
                };
                serde_json::json!({
                    "ok": false,
                    "request": request,
                    "error": error_obj(
                        ErrorCode::NotFound,
                        format!("job {:?} not found", miss.query),
                        hint,
                    ),
                    "query": miss.query,
                    "search_results": miss.search_results,
                    "suggestions": miss.suggestions,
                    "failed_subtrees": failed_subtrees(&miss.failures),
                })
            }
        };
        set_warnings(&mut payload, &warnings);
        Self::finish(payload, "get_job_info", &ctx, t0)
    }

    #[tool(
        description = "Get one build's status: the result, else BUILDING while running, else UNKNOWN"
    )]
    async fn get_build_status(
        &self,
        params: Parameters<Option<BuildArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("get_build_status");
        let args = params.0.unwrap_or_default();
        let request = serde_json::json!({ "path": args.path, "build_number": args.build_number });

        let target = require_path(args.path.as_deref())
            .and_then(|p| Ok((p, require_build_number(args.build_number)?)));
        let (path, n) = match target {
            Ok(t) => t,
            Err(e) => return Self::fail(&e, request, "get_build_status", &ctx, t0),
        };
        match self.jenkins.build_status(&ctx, &path, n).await {
            Ok(status) => {
                let mut payload = serde_json::json!({ "ok": true, "request": request });
                merge(&mut payload, &status);
                Self::finish(payload, "get_build_status", &ctx, t0)
            }
            Err(e) => Self::fail(&e, request, "get_build_status", &ctx, t0),
        }
    }

    #[tool(
        description = "Read a build's console log from a byte offset; has_more tells whether the build is still writing"
    )]
    async fn get_console_log(
        &self,
        params: Parameters<Option<ConsoleLogArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("get_console_log");
        let args = params.0.unwrap_or_default();
        let start = args.start.unwrap_or(0);
        let request = serde_json::json!({
            "path": args.path,
            "build_number": args.build_number,
            "start": start,
        });

        let target = require_path(args.path.as_deref())
            .and_then(|p| Ok((p, require_build_number(args.build_number)?)));
        let (path, n) = match target {
            Ok(t) => t,
            Err(e) => return Self::fail(&e, request, "get_console_log", &ctx, t0),
        };
        match self.jenkins.console_log(&ctx, &path, n, start).await {
            Ok(log) => {
                let mut payload = serde_json::json!({ "ok": true, "request": request });
                merge(&mut payload, &log);
                Self::finish(payload, "get_console_log", &ctx, t0)
            }
            Err(e) => Self::fail(&e, request, "get_console_log", &ctx, t0),
        }
    }

    #[tool(
        description = "List jobs (and optionally folders) in discovery order. Folders that fail to list are skipped and reported."
    )]
    async fn list_jobs(
        &self,
        params: Parameters<Option<ListJobsArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("list_jobs");
        let args = params.0.unwrap_or_default();
        let recursive = args.recursive.unwrap_or(true);
        let include_folders = args.include_folders.unwrap_or(false);
        let (requested_depth, capped) = depth(args.max_depth);
        let max_depth = if recursive { requested_depth } else { 1 };
        let request = serde_json::json!({
            "recursive": recursive,
            "max_depth": max_depth,
            "include_folders": include_folders,
        });

        let tree = walk::walk(self.api(), &ctx, &JobPath::root(), max_depth).await;
        let mut warnings = Vec::new();
        if capped && recursive {
            warnings.push("max_depth_capped");
        }
        let mut payload = Self::tree_payload(tree, include_folders, request, &mut warnings);
        set_warnings(&mut payload, &warnings);
        Self::finish(payload, "list_jobs", &ctx, t0)
    }

    fn tree_payload(
        tree: TreeWalk,
        include_folders: bool,
        request: serde_json::Value,
        warnings: &mut Vec<&'static str>,
    ) -> serde_json::Value {
        if tree.is_partial() {
            warnings.push("subtree_fetch_failed");
        }
        let jobs: Vec<_> = tree
            .items
            .into_iter()
            .filter(|i| include_folders || !i.is_folder())
            .collect();
        serde_json::json!({
            "ok": true,
            "request": request,
            "count": jobs.len(),
            "jobs": jobs,
            "partial": !tree.failures.is_empty(),
            "failed_subtrees": failed_subtrees(&tree.failures),
        })
    }

    #[tool(description = "Describe a folder and split its direct children into jobs and folders")]
    async fn get_folder_info(
        &self,
        params: Parameters<Option<FolderInfoArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("get_folder_info");
        let args = params.0.unwrap_or_default();
        let request = serde_json::json!({ "path": args.path });

        let path = match require_path(args.path.as_deref()) {
            Ok(p) => p,
            Err(e) => return Self::fail(&e, request, "get_folder_info", &ctx, t0),
        };
        match self.jenkins.folder_info(&ctx, &path).await {
            Ok(info) => {
                let mut payload = serde_json::json!({ "ok": true, "request": request });
                merge(&mut payload, &info);
                Self::finish(payload, "get_folder_info", &ctx, t0)
            }
            Err(e) => Self::fail(&e, request, "get_folder_info", &ctx, t0),
        }
    }

    #[tool(
        description = "Search the job tree with a case-insensitive glob (`*`, `?`) against names and full paths"
    )]
    async fn search_jobs(
        &self,
        params: Parameters<Option<SearchJobsArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("search_jobs");
        let args = params.0.unwrap_or_default();
        let (max_depth, capped) = depth(args.max_depth);
        let pattern = args.pattern.unwrap_or_default().trim().to_string();
        let request = serde_json::json!({
            "pattern": pattern,
            "kind": args.kind,
            "max_depth": max_depth,
        });

        if pattern.is_empty() {
            let e = Error::InvalidParams("pattern must be non-empty".to_string());
            return Self::fail(&e, request, "search_jobs", &ctx, t0);
        }
        let kind = match args.kind.as_deref().map(str::parse::<KindFilter>) {
            None => KindFilter::default(),
            Some(Ok(k)) => k,
            Some(Err(e)) => return Self::fail(&e, request, "search_jobs", &ctx, t0),
        };

        let found = resolve::search(self.api(), &ctx, &pattern, kind, max_depth).await;
        let mut warnings = Vec::new();
        if capped {
            warnings.push("max_depth_capped");
        }
        if !found.failures.is_empty() {
            warnings.push("subtree_fetch_failed");
        }
        let mut payload = serde_json::json!({
            "ok": true,
            "request": request,
            "count": found.items.len(),
            "results": found.items,
            "failed_subtrees": failed_subtrees(&found.failures),
        });
        set_warnings(&mut payload, &warnings);
        Self::finish(payload, "search_jobs", &ctx, t0)
    }

    #[tool(
        description = "Find the single job matching a glob and trigger it. Zero or multiple matches trigger nothing and return candidates."
    )]
    async fn search_and_trigger(
        &self,
        params: Parameters<Option<SearchAndTriggerArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("search_and_trigger");
        let args = params.0.unwrap_or_default();
        let (max_depth, capped) = depth(args.max_depth);
        let mut warnings = Vec::new();
        if capped {
            warnings.push("max_depth_capped");
        }
        let build_params = Self::prepare_params(args.params, &mut warnings);
        let pattern = args.pattern.unwrap_or_default().trim().to_string();
        let request = serde_json::json!({
            "pattern": pattern,
            "params": build_params,
            "max_depth": max_depth,
        });

        if pattern.is_empty() {
            let e = Error::InvalidParams("pattern must be non-empty".to_string());
            return Self::fail(&e, request, "search_and_trigger", &ctx, t0);
        }
        let outcome =
            resolve::search_and_trigger(self.api(), &ctx, &pattern, &build_params, max_depth)
                .await;
        let mut payload = match outcome {
            Err(e) => return Self::fail(&e, request, "search_and_trigger", &ctx, t0),
            Ok(TriggerMatch::Triggered { job, outcome }) => {
                let mut payload = serde_json::json!({
                    "ok": true,
                    "request": request,
                    "job": job,
                });
                merge(&mut payload, &outcome);
                payload
            }
            Ok(TriggerMatch::NoMatch { pattern, suggestions }) => serde_json::json!({
                "ok": false,
                "request": request,
                "error": error_obj(
                    ErrorCode::NoMatch,
                    format!("no job matches {pattern:?}"),
                    "Nothing was triggered. Try the suggested broader pattern.",
                ),
                "suggestions": suggestions,
            }),
            Ok(TriggerMatch::Ambiguous { pattern, matches }) => serde_json::json!({
                "ok": false,
                "request": request,
                "error": error_obj(
                    ErrorCode::AmbiguousMatch,
                    format!("{} jobs match {pattern:?}", matches.len()),
                    "Nothing was triggered. Call trigger_job with one exact path from `matches`.",
                ),
                "matches": matches,
            }),
        };
        set_warnings(&mut payload, &warnings);
        Self::finish(payload, "search_and_trigger", &ctx, t0)
    }

    #[tool(description = "List queued builds as returned by Jenkins")]
    async fn get_queue_info(&self) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("get_queue_info");
        match self.jenkins.queue(&ctx).await {
            Ok(items) => {
                let payload = serde_json::json!({
                    "ok": true,
                    "count": items.len(),
                    "items": items,
                });
                Self::finish(payload, "get_queue_info", &ctx, t0)
            }
            Err(e) => Self::fail(&e, serde_json::Value::Null, "get_queue_info", &ctx, t0),
        }
    }

    #[tool(description = "Report the Jenkins version and base URL")]
    async fn server_info(&self) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("server_info");
        match self.jenkins.server_info(&ctx).await {
            Ok(info) => {
                let mut payload = serde_json::json!({ "ok": true });
                merge(&mut payload, &info);
                Self::finish(payload, "server_info", &ctx, t0)
            }
            Err(e) => Self::fail(&e, serde_json::Value::Null, "server_info", &ctx, t0),
        }
    }

    #[tool(description = "Check that JENKINS_URL answers like a Jenkins instance (5s timeout)")]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("health");
        let h = self.jenkins.health(&ctx).await;
        let mut payload = serde_json::json!({ "ok": true });
        merge(&mut payload, &h);
        if !h.is_ok() {
            set_warnings(&mut payload, &["remote_unhealthy"]);
        }
        Self::finish(payload, "health", &ctx, t0)
    }

    #[tool(
        description = "Build a log-summary prompt for a build (no model is called; returns prompt_used and sampling_config)"
    )]
    async fn summarize_build_log(
        &self,
        params: Parameters<Option<BuildArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let (ctx, t0) = Self::begin("summarize_build_log");
        let args = params.0.unwrap_or_default();
        let request = serde_json::json!({ "path": args.path, "build_number": args.build_number });

        let target = require_path(args.path.as_deref())
            .and_then(|p| Ok((p, require_build_number(args.build_number)?)));
        let (path, n) = match target {
            Ok(t) => t,
            Err(e) => return Self::fail(&e, request, "summarize_build_log", &ctx, t0),
        };
        let log = match self.jenkins.console_log(&ctx, &path, n, 0).await {
            Ok(l) => l,
            Err(e) => return Self::fail(&e, request, "summarize_build_log", &ctx, t0),
        };
        let mut payload = serde_json::json!({
            "ok": true,
            "request": request,
            "summary": prompts::placeholder_summary(&path.to_string(), n),
            "prompt_used": prompts::summarize_log_prompt(&log.log),
            "sampling_config": prompts::SamplingConfig::default(),
            "log_truncated": log.has_more,
        });
        set_warnings(&mut payload, &["summary_is_placeholder"]);
        Self::finish(payload, "summarize_build_log", &ctx, t0)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for JobpipeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Jenkins job control. Paths are slash-separated across folders (team/backend/deploy). Outputs are JSON envelopes with ok/error; search_and_trigger never guesses between several matches."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio() -> Result<(), McpError> {
    let svc = JobpipeMcp::new()?;
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    // Keep the stdio server alive until the client closes.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}

pub(crate) async fn serve_http(addr: SocketAddr) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };

    let svc = JobpipeMcp::new().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let service = StreamableHttpService::new(
        move || Ok(svc.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving MCP over streamable HTTP at /mcp");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
