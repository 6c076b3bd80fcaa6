//! Wire shapes of the remote JSON API. Only the fields we read; everything is optional
//! because older servers and plugins omit freely.

use jobpipe_core::{JobParameterSpec, JobPath, TreeItem};
use serde::Deserialize;

pub const PARAMETERS_PROPERTY_CLASS: &str = "hudson.model.ParametersDefinitionProperty";

#[derive(Debug, Deserialize)]
pub struct CrumbResponse {
    pub crumb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub jobs: Vec<RemoteItem>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteItem {
    #[serde(rename = "_class")]
    pub class: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

impl Listing {
    /// Typed children under `parent`, classified once here. Entries whose name cannot be a
    /// path segment are logged and dropped; the rest of the listing survives.
    pub fn children(&self, parent: &JobPath) -> Vec<TreeItem> {
        self.jobs
            .iter()
            .filter_map(|j| {
                TreeItem::child_of(
                    parent,
                    &j.name,
                    j.class.as_deref(),
                    j.url.as_deref(),
                    j.description.as_deref(),
                )
                .map_err(|e| {
                    tracing::warn!(parent = %parent, error = %e, "skipping child with unusable name")
                })
                .ok()
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub property: Vec<RemoteProperty>,
    pub last_build: Option<BuildRef>,
}

#[derive(Debug, Deserialize)]
pub struct BuildRef {
    pub number: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProperty {
    #[serde(rename = "_class")]
    pub class: Option<String>,
    #[serde(default)]
    pub parameter_definitions: Vec<RemoteParameter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub default_parameter_value: Option<DefaultValue>,
    pub description: Option<String>,
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct DefaultValue {
    pub value: Option<serde_json::Value>,
}

impl RemoteJob {
    /// Declared parameters, in declaration order.
    pub fn parameters(&self) -> Vec<JobParameterSpec> {
        self.property
            .iter()
            .find(|p| p.class.as_deref() == Some(PARAMETERS_PROPERTY_CLASS))
            .map(|p| {
                p.parameter_definitions
                    .iter()
                    .map(|d| JobParameterSpec {
                        name: d.name.clone(),
                        param_type: d.param_type.clone().unwrap_or_else(|| "unknown".to_string()),
                        default_value: d.default_parameter_value.as_ref().and_then(|v| v.value.clone()),
                        description: d.description.clone(),
                        choices: d.choices.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoteBuild {
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    pub timestamp: Option<i64>,
    pub duration: Option<i64>,
    pub url: Option<String>,
}

impl RemoteBuild {
    pub fn status(&self) -> String {
        match (&self.result, self.building) {
            (Some(r), _) => r.clone(),
            (None, true) => "BUILDING".to_string(),
            (None, false) => "UNKNOWN".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInfo {
    pub jenkins_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobpipe_core::ItemKind;
    use serde_json::json;

    #[test]
    fn parameters_come_from_the_definitions_property_only() {
        let job: RemoteJob = serde_json::from_value(json!({
            "name": "deploy",
            "property": [
                {"_class": "jenkins.model.BuildDiscarderProperty"},
                {
                    "_class": "hudson.model.ParametersDefinitionProperty",
                    "parameterDefinitions": [
                        {
                            "name": "ENV",
                            "type": "ChoiceParameterDefinition",
                            "defaultParameterValue": {"value": "qa"},
                            "choices": ["qa", "prod"]
                        },
                        {"name": "DRY_RUN", "defaultParameterValue": {"value": true}},
                        {"name": "NOTES", "description": "free text"}
                    ]
                }
            ],
            "lastBuild": {"number": 42}
        }))
        .unwrap();
        let params = job.parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "ENV");
        assert_eq!(params[0].choices.as_deref(), Some(&["qa".to_string(), "prod".to_string()][..]));
        assert_eq!(params[1].param_type, "unknown");
        assert_eq!(params[1].default_value, Some(json!(true)));
        assert_eq!(params[2].default_value, None);
        assert_eq!(job.last_build.and_then(|b| b.number), Some(42));
    }

    #[test]
    fn build_status_prefers_result_then_building() {
        let done: RemoteBuild =
            serde_json::from_value(json!({"result": "FAILURE", "building": false})).unwrap();
        let running: RemoteBuild =
            serde_json::from_value(json!({"result": null, "building": true})).unwrap();
        let odd: RemoteBuild = serde_json::from_value(json!({})).unwrap();
        assert_eq!(done.status(), "FAILURE");
        assert_eq!(running.status(), "BUILDING");
        assert_eq!(odd.status(), "UNKNOWN");
    }

    #[test]
    fn listing_children_are_classified() {
        let listing: Listing = serde_json::from_value(json!({
            "jobs": [
                {"_class": "com.cloudbees.hudson.plugins.folder.Folder", "name": "team", "url": "http://ci/job/team/"},
                {"_class": "hudson.model.FreeStyleProject", "name": "app", "description": ""}
            ]
        }))
        .unwrap();
        let kids = listing.children(&JobPath::root());
        assert_eq!(kids[0].kind, ItemKind::Folder);
        assert_eq!(kids[1].kind, ItemKind::Job);
        assert_eq!(kids[1].description, None);
        assert_eq!(kids[1].url, "");
    }

    #[test]
    fn unusable_child_names_are_dropped_not_fatal() {
        let listing: Listing = serde_json::from_value(json!({
            "jobs": [
                {"name": "  "},
                {"name": "ok"},
                {"name": "a/b"}
            ]
        }))
        .unwrap();
        let parent = JobPath::parse("team").unwrap();
        let kids = listing.children(&parent);
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].full_name, "team/ok");
    }
}
