use crate::config::JenkinsConfig;
use crate::crumb::CrumbCache;
use crate::models::{
    CrumbResponse, Listing, QueueResponse, RemoteBuild, RemoteJob, RootInfo,
};
use jobpipe_core::params::normalize;
use jobpipe_core::{
    BuildParams, BuildStatus, ConsoleLog, Error, FolderInfo, Health, ItemKind, JenkinsApi,
    JobInfo, JobPath, RequestContext, Result, ServerInfo, TreeItem, TriggerOutcome,
};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const CRUMB_HEADER: &str = "Jenkins-Crumb";
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const LISTING_TREE: &str = "name,fullName,description,jobs[name,url,description]";

/// Where a call goes: a flat endpoint under the base URL, or a suffix under a job path.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Root(&'a str),
    Job { path: &'a JobPath, suffix: &'a str },
}

impl<'a> Target<'a> {
    pub fn job(path: &'a JobPath, suffix: &'a str) -> Self {
        Self::Job { path, suffix }
    }

    pub fn url(&self, base: &str) -> String {
        match self {
            Self::Root(endpoint) => format!("{base}/{}", endpoint.trim_start_matches('/')),
            Self::Job { path, suffix } => {
                format!("{base}/job/{}/{}", path.encode(), suffix.trim_start_matches('/'))
            }
        }
    }
}

/// Optional parts of a call.
#[derive(Debug, Default)]
pub struct CallOptions {
    pub query: Vec<(String, String)>,
    pub form: Option<BTreeMap<String, String>>,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn query(mut self, k: &str, v: impl Into<String>) -> Self {
        self.query.push((k.to_string(), v.into()));
        self
    }

    pub fn form(mut self, form: BTreeMap<String, String>) -> Self {
        self.form = Some(form);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}

#[derive(Debug)]
pub struct JenkinsClient {
    http: reqwest::Client,
    config: JenkinsConfig,
    crumbs: CrumbCache,
}

impl JenkinsClient {
    pub fn new(config: JenkinsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("jobpipe/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            http,
            config,
            crumbs: CrumbCache::default(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(JenkinsConfig::from_env()?)
    }

    pub fn config(&self) -> &JenkinsConfig {
        &self.config
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.user {
            Some(user) => rb.basic_auth(user, self.config.api_token.as_deref()),
            None => rb,
        }
    }

    async fn fetch_crumb(&self, ctx: &RequestContext) -> Result<String> {
        let url = Target::Root("crumbIssuer/api/json").url(&self.config.base_url);
        tracing::debug!(request_id = %ctx.request_id(), url = %url, "fetching crumb");
        let resp = self
            .authed(self.http.get(&url))
            .timeout(self.config.crumb_timeout)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("crumb issuer unreachable: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("crumb issuer HTTP {status}")));
        }
        let body: CrumbResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("crumb issuer returned bad JSON: {e}")))?;
        body.crumb
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Auth("crumb issuer response has no crumb".to_string()))
    }

    /// Issue one authenticated call. Mutating verbs carry the CSRF crumb when one can be
    /// obtained; any non-2xx status becomes `Error::Http`.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        method: Method,
        target: Target<'_>,
        opts: CallOptions,
    ) -> Result<reqwest::Response> {
        let url = target.url(&self.config.base_url);
        let mut rb = self.authed(self.http.request(method.clone(), &url));
        if !opts.query.is_empty() {
            rb = rb.query(&opts.query);
        }
        if let Some(form) = &opts.form {
            rb = rb.form(form);
        }
        if !opts.headers.is_empty() {
            rb = rb.headers(opts.headers);
        }
        if let Some(t) = opts.timeout {
            rb = rb.timeout(t);
        }
        if is_mutating(&method) {
            let crumb = self
                .crumbs
                .get_or_refresh(ctx, Instant::now(), || self.fetch_crumb(ctx))
                .await;
            if let Some(crumb) = crumb {
                rb = rb.header(CRUMB_HEADER, crumb);
            }
        }

        tracing::info!(request_id = %ctx.request_id(), %method, url = %url, "remote request");
        let resp = rb.send().await.map_err(|e| {
            tracing::warn!(request_id = %ctx.request_id(), %method, url = %url, error = %e, "remote request failed");
            Error::Network(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(
                request_id = %ctx.request_id(),
                %method,
                url = %url,
                status = status.as_u16(),
                "remote request returned an error status"
            );
            return Err(Error::Http {
                status: status.as_u16(),
                message: format!(
                    "{method} {url}: {}",
                    status.canonical_reason().unwrap_or("error")
                ),
            });
        }
        tracing::debug!(request_id = %ctx.request_id(), status = status.as_u16(), "remote request ok");
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        target: Target<'_>,
        opts: CallOptions,
    ) -> Result<T> {
        let resp = self.execute(ctx, Method::GET, target, opts).await?;
        resp.json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn build_status(
        &self,
        ctx: &RequestContext,
        path: &JobPath,
        build_number: u64,
    ) -> Result<BuildStatus> {
        let suffix = format!("{build_number}/api/json");
        let build: RemoteBuild = self
            .get_json(ctx, Target::job(path, &suffix), CallOptions::default())
            .await?;
        Ok(BuildStatus {
            path: path.to_string(),
            build_number,
            status: build.status(),
            timestamp: build.timestamp,
            duration: build.duration,
            url: build.url,
        })
    }

    /// Progressive console text from byte offset `start`.
    pub async fn console_log(
        &self,
        ctx: &RequestContext,
        path: &JobPath,
        build_number: u64,
        start: u64,
    ) -> Result<ConsoleLog> {
        let suffix = format!("{build_number}/logText/progressiveText");
        let resp = self
            .execute(
                ctx,
                Method::GET,
                Target::job(path, &suffix),
                CallOptions::default().query("start", start.to_string()),
            )
            .await?;
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .map(str::to_string)
        };
        let has_more = header("X-More-Data")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let size = header("X-Text-Size").and_then(|v| v.parse::<u64>().ok());
        let log = resp.text().await.map_err(|e| Error::Decode(e.to_string()))?;
        Ok(ConsoleLog {
            log,
            has_more,
            size,
        })
    }

    pub async fn folder_info(&self, ctx: &RequestContext, path: &JobPath) -> Result<FolderInfo> {
        let listing: Listing = self
            .get_json(
                ctx,
                Target::job(path, "api/json"),
                CallOptions::default().query("tree", LISTING_TREE),
            )
            .await?;
        let (folders, jobs): (Vec<TreeItem>, Vec<TreeItem>) = listing
            .children(path)
            .into_iter()
            .partition(|i| i.kind == ItemKind::Folder);
        Ok(FolderInfo {
            name: listing
                .name
                .clone()
                .or_else(|| path.name().map(str::to_string))
                .unwrap_or_default(),
            full_name: listing.full_name.clone().unwrap_or_else(|| path.to_string()),
            description: listing.description.clone().filter(|d| !d.trim().is_empty()),
            jobs,
            folders,
        })
    }

    /// Raw queue items, passed through untouched.
    pub async fn queue(&self, ctx: &RequestContext) -> Result<Vec<serde_json::Value>> {
        let q: QueueResponse = self
            .get_json(ctx, Target::Root("queue/api/json"), CallOptions::default())
            .await?;
        Ok(q.items)
    }

    pub async fn server_info(&self, ctx: &RequestContext) -> Result<ServerInfo> {
        let resp = self
            .execute(ctx, Method::GET, Target::Root("api/json"), CallOptions::default())
            .await?;
        let header_version = resp
            .headers()
            .get("X-Jenkins")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let root: RootInfo = resp.json().await.map_err(|e| Error::Decode(e.to_string()))?;
        Ok(ServerInfo {
            version: root.jenkins_version.or(header_version),
            url: self.config.base_url.clone(),
        })
    }

    /// Reachability check. Never fails; problems are reported in the result.
    pub async fn health(&self, ctx: &RequestContext) -> Health {
        let reply = self
            .execute(
                ctx,
                Method::GET,
                Target::Root("api/json"),
                CallOptions::default().timeout(HEALTH_TIMEOUT),
            )
            .await;
        match reply {
            Ok(resp) if resp.headers().contains_key("X-Jenkins") => Health::ok(),
            Ok(_) => Health::error(
                "Failed to connect to Jenkins: endpoint did not respond like a Jenkins instance",
            ),
            Err(e) => Health::error(format!("Failed to connect to Jenkins: {e}")),
        }
    }
}

#[async_trait::async_trait]
impl JenkinsApi for JenkinsClient {
    async fn list_children(&self, ctx: &RequestContext, path: &JobPath) -> Result<Vec<TreeItem>> {
        let target = if path.is_root() {
            Target::Root("api/json")
        } else {
            Target::job(path, "api/json")
        };
        let listing: Listing = self
            .get_json(ctx, target, CallOptions::default().query("tree", LISTING_TREE))
            .await?;
        Ok(listing.children(path))
    }

    async fn job_info(&self, ctx: &RequestContext, path: &JobPath) -> Result<JobInfo> {
        let job: RemoteJob = self
            .get_json(ctx, Target::job(path, "api/json"), CallOptions::default())
            .await?;
        let parameters = job.parameters();
        tracing::info!(
            request_id = %ctx.request_id(),
            job = %path,
            parameters = parameters.len(),
            "job info fetched"
        );
        Ok(JobInfo {
            name: job
                .name
                .or_else(|| path.name().map(str::to_string))
                .unwrap_or_default(),
            full_name: job.full_name.unwrap_or_else(|| path.to_string()),
            description: job.description,
            url: job.url,
            parameters,
            last_build_number: job.last_build.and_then(|b| b.number),
            last_build_status: None,
        })
    }

    async fn trigger_job(
        &self,
        ctx: &RequestContext,
        path: &JobPath,
        params: &BuildParams,
    ) -> Result<TriggerOutcome> {
        let normalized = normalize(params);
        let (suffix, opts) = if normalized.is_empty() {
            ("build", CallOptions::default())
        } else {
            (
                "buildWithParameters",
                CallOptions::default().form(normalized.clone()),
            )
        };
        let resp = self
            .execute(ctx, Method::POST, Target::job(path, suffix), opts)
            .await?;
        let queue_url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::info!(
            request_id = %ctx.request_id(),
            job = %path,
            queue_url = queue_url.as_deref().unwrap_or(""),
            "build triggered"
        );
        Ok(TriggerOutcome {
            path: path.to_string(),
            status: "Triggered".to_string(),
            queue_url,
            normalized_params: (!normalized.is_empty()).then_some(normalized),
        })
    }
}
