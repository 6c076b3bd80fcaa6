use jobpipe_core::{Error, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_CRUMB_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Connection settings for one remote server.
#[derive(Clone)]
pub struct JenkinsConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub user: Option<String>,
    pub api_token: Option<String>,
    pub crumb_timeout: Duration,
    pub request_timeout: Duration,
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("crumb_timeout", &self.crumb_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl JenkinsConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            user: None,
            api_token: None,
            crumb_timeout: Duration::from_millis(DEFAULT_CRUMB_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        })
    }

    pub fn with_credentials(mut self, user: impl Into<String>, api_token: Option<String>) -> Self {
        self.user = Some(user.into());
        self.api_token = api_token;
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base = get("JENKINS_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut cfg = Self::new(&base)?;
        cfg.user = get("JENKINS_USER");
        cfg.api_token = get("JENKINS_API_TOKEN");
        if let Some(ms) = get("JOBPIPE_CRUMB_TIMEOUT_MS") {
            cfg.crumb_timeout = parse_ms("JOBPIPE_CRUMB_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = get("JOBPIPE_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = parse_ms("JOBPIPE_REQUEST_TIMEOUT_MS", &ms)?;
        }
        Ok(cfg)
    }

    pub fn has_credentials(&self) -> bool {
        self.user.is_some()
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::NotConfigured(format!("JENKINS_URL {trimmed:?} is not a URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(Error::NotConfigured(format!(
            "JENKINS_URL must use http or https, got {other:?}"
        ))),
    }
}

fn parse_ms(var: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw
        .parse()
        .map_err(|_| Error::NotConfigured(format!("{var} must be milliseconds, got {raw:?}")))?;
    Ok(Duration::from_millis(ms.max(1)))
}
