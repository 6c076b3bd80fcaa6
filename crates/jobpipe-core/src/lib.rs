use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod matching;
pub mod params;
pub mod path;
pub mod resolve;
pub mod walk;

pub use params::BuildParams;
pub use path::JobPath;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid job path: {0}")]
    InvalidPath(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("auth failed: {0}")]
    Auth(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

impl Error {
    /// HTTP status carried by the error, if it came from a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-invocation context threaded through every remote call made on behalf of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker looked for (case-insensitively) in the remote `_class` discriminator.
pub const FOLDER_MARKER: &str = "folder";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Job,
    Folder,
}

impl ItemKind {
    /// Decide the kind once, at ingestion. A missing class tag is a job.
    pub fn classify(class: Option<&str>) -> Self {
        match class {
            Some(c) if c.to_ascii_lowercase().contains(FOLDER_MARKER) => Self::Folder,
            _ => Self::Job,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Folder => "folder",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    Job,
    Folder,
    All,
}

impl KindFilter {
    pub fn admits(self, kind: ItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Job => kind == ItemKind::Job,
            Self::Folder => kind == ItemKind::Folder,
        }
    }
}

impl std::str::FromStr for KindFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "job" | "jobs" => Ok(Self::Job),
            "folder" | "folders" => Ok(Self::Folder),
            "all" | "any" => Ok(Self::All),
            other => Err(Error::InvalidParams(format!(
                "unknown item kind {other:?} (expected job, folder or all)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeItem {
    /// Last path segment.
    pub name: String,
    /// Full path, `/`-separated.
    pub full_name: String,
    pub kind: ItemKind,
    pub url: String,
    pub description: Option<String>,
}

impl TreeItem {
    /// Build the item for a child listed under `parent`.
    pub fn child_of(
        parent: &JobPath,
        name: &str,
        class: Option<&str>,
        url: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self> {
        let path = parent.child(name)?;
        Ok(Self {
            name: name.to_string(),
            full_name: path.to_string(),
            kind: ItemKind::classify(class),
            url: url.unwrap_or_default().to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub default_value: Option<serde_json::Value>,
    pub description: Option<String>,
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInfo {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub parameters: Vec<JobParameterSpec>,
    pub last_build_number: Option<u64>,
    /// Needs a separate build lookup; never filled by the job metadata call.
    pub last_build_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildStatus {
    pub path: String,
    pub build_number: u64,
    pub status: String,
    pub timestamp: Option<i64>,
    pub duration: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleLog {
    pub log: String,
    pub has_more: bool,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerOutcome {
    pub path: String,
    pub status: String,
    pub queue_url: Option<String>,
    pub normalized_params: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderInfo {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub jobs: Vec<TreeItem>,
    pub folders: Vec<TreeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub status: String,
    pub details: Option<String>,
}

impl Health {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            details: None,
        }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            details: Some(details.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// The slice of the remote surface the walker and resolver depend on.
#[async_trait::async_trait]
pub trait JenkinsApi: Send + Sync {
    /// Immediate children of `path` (the top-level listing when `path` is the root).
    async fn list_children(&self, ctx: &RequestContext, path: &JobPath) -> Result<Vec<TreeItem>>;

    async fn job_info(&self, ctx: &RequestContext, path: &JobPath) -> Result<JobInfo>;

    /// Queue a build. An empty `params` map triggers a plain build.
    async fn trigger_job(
        &self,
        ctx: &RequestContext,
        path: &JobPath,
        params: &BuildParams,
    ) -> Result<TriggerOutcome>;
}
