//! Build parameter normalization.
//!
//! The remote parameter API only accepts strings: lists are comma-joined (multiselect
//! convention), booleans are lowercase literals, everything else uses its plain form.

use serde_json::Value;
use std::collections::BTreeMap;

/// Caller-supplied build parameters, polymorphic over string/bool/number/list.
pub type BuildParams = BTreeMap<String, Value>;

pub fn normalize(params: &BuildParams) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let s = match v {
                Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
                other => scalar(other),
            };
            (k.clone(), s)
        })
        .collect()
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => v.to_string(),
    }
}

/// Accept the legacy wrapped shape `{"args": {"params": {...}}}` some clients still send.
pub fn unwrap_legacy(params: BuildParams) -> BuildParams {
    let inner = params
        .get("args")
        .and_then(Value::as_object)
        .and_then(|args| args.get("params"))
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BuildParams>()
        });
    inner.unwrap_or(params)
}
