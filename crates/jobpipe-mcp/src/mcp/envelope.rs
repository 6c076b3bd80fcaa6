use jobpipe_core::{Error, RequestContext};
use serde::Serialize;

pub(crate) fn warning_hint(code: &'static str) -> Option<&'static str> {
    match code {
        "subtree_fetch_failed" => Some(
            "Some folders could not be listed (HTTP or network error) and were treated as empty. Results may be incomplete; check permissions on the folders named in `failed_subtrees`.",
        ),
        "legacy_params_unwrapped" => Some(
            "Parameters were sent in the legacy {\"args\": {\"params\": {...}}} shape and were unwrapped. Pass the parameter map directly as `params`.",
        ),
        "max_depth_capped" => Some(
            "max_depth was above the server limit and was lowered. Narrow the search with a folder-specific pattern instead.",
        ),
        "summary_is_placeholder" => Some(
            "No model is called server-side. `prompt_used` and `sampling_config` are ready to send to your own LLM.",
        ),
        "remote_unhealthy" => Some(
            "The Jenkins endpoint did not answer like a Jenkins instance. Check JENKINS_URL and credentials (`jobpipe doctor`).",
        ),
        _ => None,
    }
}

pub(crate) fn warning_hints_from(codes: &[&'static str]) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    for c in codes {
        if let Some(h) = warning_hint(c) {
            m.insert((*c).to_string(), serde_json::json!(h));
        }
    }
    serde_json::Value::Object(m)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    NotConfigured,
    NotFound,
    AmbiguousMatch,
    NoMatch,
    HttpError,
    NetworkError,
    AuthFailed,
    DecodeFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::NotConfigured => "not_configured",
            Self::NotFound => "not_found",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::NoMatch => "no_match",
            Self::HttpError => "http_error",
            Self::NetworkError => "network_error",
            Self::AuthFailed => "auth_failed",
            Self::DecodeFailed => "decode_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    /// Server-side 5xx is also retryable; see [`error_obj_from`].
    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::NetworkError => true,
            Self::InvalidParams
            | Self::NotConfigured
            | Self::NotFound
            | Self::AmbiguousMatch
            | Self::NoMatch
            | Self::HttpError
            | Self::AuthFailed
            | Self::DecodeFailed
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn for_error(e: &Error) -> Self {
        match e {
            Error::InvalidPath(_) | Error::InvalidParams(_) => Self::InvalidParams,
            Error::NotConfigured(_) => Self::NotConfigured,
            Error::Network(_) => Self::NetworkError,
            Error::Http { status: 404, .. } => Self::NotFound,
            Error::Http {
                status: 401 | 403, ..
            } => Self::AuthFailed,
            Error::Http { .. } => Self::HttpError,
            Error::Auth(_) => Self::AuthFailed,
            Error::Decode(_) => Self::DecodeFailed,
        }
    }
}

pub(crate) fn add_envelope_fields(
    payload: &mut serde_json::Value,
    kind: &str,
    ctx: &RequestContext,
    elapsed_ms: u128,
) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    payload["request_id"] = serde_json::json!(ctx.request_id());
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
    if payload.get("warnings").is_none() {
        payload["warnings"] = serde_json::json!([]);
    }
    if payload.get("warning_hints").is_none() {
        payload["warning_hints"] = serde_json::json!({});
    }
}

pub(crate) fn set_warnings(payload: &mut serde_json::Value, codes: &[&'static str]) {
    payload["warnings"] = serde_json::json!(codes);
    payload["warning_hints"] = warning_hints_from(codes);
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    error_obj_with(code, message, hint, code.retryable())
}

fn error_obj_with(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
    retryable: bool,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable,
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": retryable
        }),
    }
}

/// Error object for a propagated backend failure.
pub(crate) fn error_obj_from(e: &Error) -> serde_json::Value {
    let code = ErrorCode::for_error(e);
    let retryable = code.retryable() || e.status().is_some_and(|s| s >= 500);
    error_obj_with(code, e, hint_for(code, e), retryable)
}

fn hint_for(code: ErrorCode, e: &Error) -> String {
    match code {
        ErrorCode::InvalidParams => {
            "Pass a slash-separated job path such as \"team/backend/deploy\".".to_string()
        }
        ErrorCode::NotConfigured => {
            "Check JENKINS_URL and the JOBPIPE_* timeouts; run `jobpipe doctor`.".to_string()
        }
        ErrorCode::NotFound => {
            "No item at that exact path. Use search_jobs or list_jobs to find the right path."
                .to_string()
        }
        ErrorCode::AuthFailed => {
            "Jenkins rejected the credentials. Check JENKINS_USER and JENKINS_API_TOKEN."
                .to_string()
        }
        ErrorCode::NetworkError => {
            "Jenkins was unreachable or timed out. Retry, or check JENKINS_URL.".to_string()
        }
        ErrorCode::HttpError if e.status().is_some_and(|s| s >= 500) => {
            "Jenkins returned a server error. Retry later.".to_string()
        }
        ErrorCode::DecodeFailed => {
            "Jenkins answered with an unexpected body. Check that JENKINS_URL points at Jenkins."
                .to_string()
        }
        _ => "See the message for details.".to_string(),
    }
}
