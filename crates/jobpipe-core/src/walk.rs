//! Depth-bounded, pre-order enumeration of the remote folder tree.
//!
//! The depth bound is the only cycle guard: remote paths are trusted as unique within one
//! traversal, so no identity tracking is done. A subtree whose listing fails is logged and
//! treated as empty; the walk itself never fails.

use crate::{JenkinsApi, JobPath, RequestContext, TreeItem};
use serde::Serialize;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeWalk {
    /// Discovery order: each folder precedes its own subtree.
    pub items: Vec<TreeItem>,
    pub failures: Vec<SubtreeFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubtreeFailure {
    pub path: String,
    pub error: String,
}

impl TreeWalk {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Walk everything beneath `root` (the root path means the top-level listing).
///
/// The listing of `root` happens at depth 0; with `max_depth == 0` nothing is fetched.
/// A folder discovered by a listing at depth `d` is expanded at depth `d + 1`, and only if
/// `d + 1 < max_depth`.
pub async fn walk(
    api: &dyn JenkinsApi,
    ctx: &RequestContext,
    root: &JobPath,
    max_depth: usize,
) -> TreeWalk {
    let mut out = TreeWalk::default();
    // Pending items, top of stack is next in pre-order. Each entry carries the depth at
    // which its own children would be listed.
    let mut stack: Vec<(TreeItem, JobPath, usize)> = Vec::new();

    expand(api, ctx, root, 0, max_depth, &mut stack, &mut out).await;
    while let Some((item, path, depth)) = stack.pop() {
        let is_folder = item.is_folder();
        out.items.push(item);
        if is_folder {
            expand(api, ctx, &path, depth, max_depth, &mut stack, &mut out).await;
        }
    }

    tracing::debug!(
        request_id = %ctx.request_id(),
        root = %root,
        max_depth,
        items = out.items.len(),
        failed_subtrees = out.failures.len(),
        "tree walk finished"
    );
    out
}

async fn expand(
    api: &dyn JenkinsApi,
    ctx: &RequestContext,
    path: &JobPath,
    depth: usize,
    max_depth: usize,
    stack: &mut Vec<(TreeItem, JobPath, usize)>,
    out: &mut TreeWalk,
) {
    if depth >= max_depth {
        return;
    }
    let children = match api.list_children(ctx, path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                path = %path,
                depth,
                error = %e,
                "subtree listing failed; treating as empty"
            );
            out.failures.push(SubtreeFailure {
                path: path.to_string(),
                error: e.to_string(),
            });
            return;
        }
    };
    // Listings only yield items whose names are valid path segments.
    for child in children.into_iter().rev() {
        if let Ok(child_path) = path.child(&child.name) {
            stack.push((child, child_path, depth + 1));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        BuildParams, Error, ItemKind, JobInfo, Result, TriggerOutcome, FOLDER_MARKER,
    };
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory tree. Keys are parent paths (`""` for the top level).
    #[derive(Default)]
    pub(crate) struct FakeJenkins {
        pub children: BTreeMap<String, Vec<(String, ItemKind)>>,
        pub failing: BTreeSet<String>,
        pub listings: Mutex<Vec<String>>,
        pub triggers: AtomicUsize,
        pub triggered: Mutex<Vec<String>>,
    }

    impl FakeJenkins {
        pub fn with(mut self, parent: &str, kids: &[(&str, ItemKind)]) -> Self {
            self.children.insert(
                parent.to_string(),
                kids.iter().map(|(n, k)| (n.to_string(), *k)).collect(),
            );
            self
        }

        pub fn failing_at(mut self, parent: &str) -> Self {
            self.failing.insert(parent.to_string());
            self
        }

        pub fn is_job(&self, full: &str) -> bool {
            let path = JobPath::parse(full).ok();
            let parent = path
                .as_ref()
                .map(|p| p.segments()[..p.segments().len() - 1].join("/"))
                .unwrap_or_default();
            let name = path.as_ref().and_then(|p| p.name()).unwrap_or_default();
            self.children
                .get(&parent)
                .map(|kids| {
                    kids.iter()
                        .any(|(n, k)| n == name && *k == ItemKind::Job)
                })
                .unwrap_or(false)
        }
    }

    #[async_trait::async_trait]
    impl JenkinsApi for FakeJenkins {
        async fn list_children(
            &self,
            _ctx: &RequestContext,
            path: &JobPath,
        ) -> Result<Vec<TreeItem>> {
            let key = path.to_string();
            self.listings
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(key.clone());
            if self.failing.contains(&key) {
                return Err(Error::Http {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            let kids = self.children.get(&key).cloned().unwrap_or_default();
            kids.iter()
                .map(|(name, kind)| {
                    let class = match kind {
                        ItemKind::Folder => FOLDER_MARKER,
                        ItemKind::Job => "hudson.model.FreeStyleProject",
                    };
                    TreeItem::child_of(path, name, Some(class), Some("http://ci/"), None)
                })
                .collect()
        }

        async fn job_info(&self, _ctx: &RequestContext, path: &JobPath) -> Result<JobInfo> {
            if !self.is_job(&path.to_string()) {
                return Err(Error::Http {
                    status: 404,
                    message: "Not Found".to_string(),
                });
            }
            Ok(JobInfo {
                name: path.name().unwrap_or_default().to_string(),
                full_name: path.to_string(),
                description: None,
                url: None,
                parameters: Vec::new(),
                last_build_number: Some(7),
                last_build_status: None,
            })
        }

        async fn trigger_job(
            &self,
            _ctx: &RequestContext,
            path: &JobPath,
            params: &BuildParams,
        ) -> Result<TriggerOutcome> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            self.triggered
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(path.to_string());
            Ok(TriggerOutcome {
                path: path.to_string(),
                status: "Triggered".to_string(),
                queue_url: Some("http://ci/queue/item/1/".to_string()),
                normalized_params: (!params.is_empty()).then(|| crate::params::normalize(params)),
            })
        }
    }

    pub(crate) fn fixture() -> FakeJenkins {
        use ItemKind::{Folder, Job};
        FakeJenkins::default()
            .with(
                "",
                &[("build-a", Job), ("buildFolder", Folder), ("build-b", Job)],
            )
            .with("buildFolder", &[("inner", Job), ("deep", Folder)])
            .with("buildFolder/deep", &[("deploy-prod", Job)])
    }

    fn names(w: &TreeWalk) -> Vec<&str> {
        w.items.iter().map(|i| i.full_name.as_str()).collect()
    }

    #[tokio::test]
    async fn walk_is_pre_order_with_folders_listed() {
        let api = fixture();
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 10).await;
        assert_eq!(
            names(&w),
            vec![
                "build-a",
                "buildFolder",
                "buildFolder/inner",
                "buildFolder/deep",
                "buildFolder/deep/deploy-prod",
                "build-b",
            ]
        );
        assert!(!w.is_partial());
    }

    #[tokio::test]
    async fn zero_depth_fetches_nothing() {
        let api = fixture();
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 0).await;
        assert!(w.items.is_empty());
        assert!(api.listings.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn depth_bound_stops_expansion() {
        let api = fixture();
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 1).await;
        assert_eq!(names(&w), vec!["build-a", "buildFolder", "build-b"]);
        assert_eq!(*api.listings.lock().unwrap(), vec![String::new()]);

        let api = fixture();
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 2).await;
        assert!(names(&w).contains(&"buildFolder/deep"));
        assert!(!names(&w).contains(&"buildFolder/deep/deploy-prod"));
        assert!(!api
            .listings
            .lock()
            .unwrap()
            .contains(&"buildFolder/deep".to_string()));
    }

    #[tokio::test]
    async fn walk_from_nested_root() {
        let api = fixture();
        let root = JobPath::parse("buildFolder").unwrap();
        let w = walk(&api, &RequestContext::new(), &root, 10).await;
        assert_eq!(
            names(&w),
            vec![
                "buildFolder/inner",
                "buildFolder/deep",
                "buildFolder/deep/deploy-prod"
            ]
        );
    }

    #[tokio::test]
    async fn failed_subtree_is_empty_not_fatal() {
        let api = fixture().failing_at("buildFolder");
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 10).await;
        assert_eq!(names(&w), vec!["build-a", "buildFolder", "build-b"]);
        assert_eq!(w.failures.len(), 1);
        assert_eq!(w.failures[0].path, "buildFolder");
        assert!(w.is_partial());
    }

    #[tokio::test]
    async fn failed_root_listing_yields_empty_walk() {
        let api = fixture().failing_at("");
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 10).await;
        assert!(w.items.is_empty());
        assert_eq!(w.failures.len(), 1);
    }

    #[tokio::test]
    async fn self_referencing_folder_is_bounded_by_depth() {
        // "loop" lists a child folder also called "loop", forever.
        let mut api = FakeJenkins::default().with("", &[("loop", ItemKind::Folder)]);
        let mut key = String::from("loop");
        for _ in 0..20 {
            api = api.with(&key, &[("loop", ItemKind::Folder)]);
            key.push_str("/loop");
        }
        let w = walk(&api, &RequestContext::new(), &JobPath::root(), 4).await;
        assert_eq!(w.items.len(), 4);
        assert_eq!(api.listings.lock().unwrap().len(), 4);
    }
}
