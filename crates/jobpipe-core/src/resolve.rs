//! Job lookup on top of the tree walker: direct fetch with search fallback, pattern
//! search, and the exactness-gated search-then-trigger.

use crate::matching::{item_matches, item_matches_loosely, WildcardPattern};
use crate::walk::{walk, SubtreeFailure};
use crate::{
    BuildParams, ItemKind, JenkinsApi, JobInfo, JobPath, KindFilter, RequestContext,
    Result, TreeItem, TriggerOutcome,
};
use serde::Serialize;
use serde_json::json;

/// How many exact-path suggestions a miss lists before pointing at a broader search.
const MAX_PATH_SUGGESTIONS: usize = 3;

/// An actionable next step: which tool to call, with which arguments, and why.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub reason: String,
}

impl Suggestion {
    fn new(tool: &str, arguments: serde_json::Value, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            arguments,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobMiss {
    pub query: String,
    pub search_results: Vec<TreeItem>,
    pub suggestions: Vec<Suggestion>,
    pub failures: Vec<SubtreeFailure>,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(JobInfo),
    NotFound(JobMiss),
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub items: Vec<TreeItem>,
    pub failures: Vec<SubtreeFailure>,
}

#[derive(Debug, Clone)]
pub enum TriggerMatch {
    Triggered {
        job: TreeItem,
        outcome: TriggerOutcome,
    },
    NoMatch {
        pattern: String,
        suggestions: Vec<Suggestion>,
    },
    Ambiguous {
        pattern: String,
        matches: Vec<TreeItem>,
    },
}

/// Fetch job metadata, falling back to a tree search on 404 when `auto_search` is set.
///
/// Any other error, and a 404 with `auto_search` off, is returned unchanged.
pub async fn resolve_info(
    api: &dyn JenkinsApi,
    ctx: &RequestContext,
    name: &JobPath,
    auto_search: bool,
    max_depth: usize,
) -> Result<Resolution> {
    let err = match api.job_info(ctx, name).await {
        Ok(info) => return Ok(Resolution::Found(info)),
        Err(e) if e.is_not_found() && auto_search => e,
        Err(e) => return Err(e),
    };

    let query = name.to_string();
    tracing::info!(
        request_id = %ctx.request_id(),
        query = %query,
        error = %err,
        "direct lookup missed; searching the tree"
    );
    let matcher = WildcardPattern::new(&query);
    let tree = walk(api, ctx, &JobPath::root(), max_depth).await;
    let search_results: Vec<TreeItem> = tree
        .items
        .into_iter()
        .filter(|i| i.kind == ItemKind::Job && item_matches_loosely(&matcher, i))
        .collect();

    let suggestions = if search_results.is_empty() {
        discovery_suggestions(&query)
    } else {
        path_suggestions(&query, &search_results)
    };
    tracing::info!(
        request_id = %ctx.request_id(),
        query = %query,
        candidates = search_results.len(),
        "search fallback finished"
    );
    Ok(Resolution::NotFound(JobMiss {
        query,
        search_results,
        suggestions,
        failures: tree.failures,
    }))
}

/// Items whose name or full path matches `pattern`, in discovery order.
pub async fn search(
    api: &dyn JenkinsApi,
    ctx: &RequestContext,
    pattern: &str,
    kind: KindFilter,
    max_depth: usize,
) -> SearchResults {
    let matcher = WildcardPattern::new(pattern);
    let tree = walk(api, ctx, &JobPath::root(), max_depth).await;
    let items = tree
        .items
        .into_iter()
        .filter(|i| kind.admits(i.kind) && item_matches(&matcher, i))
        .collect();
    SearchResults {
        items,
        failures: tree.failures,
    }
}

/// Trigger the single job matching `pattern`. Never picks among several candidates.
pub async fn search_and_trigger(
    api: &dyn JenkinsApi,
    ctx: &RequestContext,
    pattern: &str,
    params: &BuildParams,
    max_depth: usize,
) -> Result<TriggerMatch> {
    let found = search(api, ctx, pattern, KindFilter::Job, max_depth).await;
    let mut matches = found.items;
    match matches.len() {
        0 => Ok(TriggerMatch::NoMatch {
            pattern: pattern.to_string(),
            suggestions: no_match_suggestions(pattern),
        }),
        1 => {
            let job = matches.remove(0);
            let path = JobPath::parse(&job.full_name)?;
            tracing::info!(
                request_id = %ctx.request_id(),
                pattern,
                job = %path,
                "pattern resolved to a single job; triggering"
            );
            let outcome = api.trigger_job(ctx, &path, params).await?;
            Ok(TriggerMatch::Triggered { job, outcome })
        }
        n => {
            tracing::info!(
                request_id = %ctx.request_id(),
                pattern,
                candidates = n,
                "pattern is ambiguous; not triggering"
            );
            Ok(TriggerMatch::Ambiguous {
                pattern: pattern.to_string(),
                matches,
            })
        }
    }
}

/// `*core*` for a pattern that is not already wrapped in stars.
pub fn broaden_pattern(pattern: &str) -> Option<String> {
    let core = pattern.trim().trim_matches('*');
    if core.is_empty() {
        return None;
    }
    let broad = format!("*{core}*");
    (broad != pattern.trim()).then_some(broad)
}

fn path_suggestions(query: &str, results: &[TreeItem]) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = results
        .iter()
        .take(MAX_PATH_SUGGESTIONS)
        .enumerate()
        .map(|(i, item)| {
            let reason = if i == 0 {
                format!("Closest match for {query:?}; use its exact path")
            } else {
                format!("Alternative match for {query:?}")
            };
            Suggestion::new("get_job_info", json!({ "path": item.full_name }), reason)
        })
        .collect();
    if results.len() > MAX_PATH_SUGGESTIONS {
        out.push(Suggestion::new(
            "search_jobs",
            json!({ "pattern": broaden_pattern(query).unwrap_or_else(|| query.to_string()) }),
            format!("{} candidates in total; narrow them with a pattern", results.len()),
        ));
    }
    out
}

fn discovery_suggestions(query: &str) -> Vec<Suggestion> {
    let mut out = Vec::new();
    if let Some(broad) = broaden_pattern(query) {
        out.push(Suggestion::new(
            "search_jobs",
            json!({ "pattern": broad, "kind": "all" }),
            "Search with a broader wildcard pattern",
        ));
    }
    out.push(Suggestion::new(
        "list_jobs",
        json!({ "recursive": true, "include_folders": true }),
        "List every job and folder to find the right path",
    ));
    out
}

fn no_match_suggestions(pattern: &str) -> Vec<Suggestion> {
    let mut out = Vec::new();
    if let Some(broad) = broaden_pattern(pattern) {
        out.push(Suggestion::new(
            "search_and_trigger",
            json!({ "pattern": broad }),
            "Retry with a broader pattern",
        ));
    }
    out.push(Suggestion::new(
        "list_jobs",
        json!({ "recursive": true }),
        "List jobs to pick an exact path",
    ));
    out
}
