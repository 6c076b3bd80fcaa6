//! Slash-delimited job paths and their nested URL encoding.
//!
//! The remote server addresses each hierarchy level as `job/<segment>`, so a path like
//! `team/backend/deploy` becomes `team/job/backend/job/deploy` once encoded. Callers prefix
//! the leading `job/` themselves.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const SEGMENT_SEPARATOR: &str = "/job/";

/// An ordered sequence of non-empty segments. The empty sequence is the root of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobPath {
    segments: Vec<String>,
}

impl JobPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a user-supplied path. Surrounding whitespace and slashes are ignored; empty
    /// input and empty inner segments (`a//b`) are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::InvalidPath("job path must be non-empty".to_string()));
        }
        let mut segments = Vec::new();
        for seg in trimmed.split('/') {
            if seg.trim().is_empty() {
                return Err(Error::InvalidPath(format!(
                    "job path {raw:?} contains an empty segment"
                )));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    pub fn child(&self, name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidPath(format!(
                "empty child name under {:?}",
                self.to_string()
            )));
        }
        if name.contains('/') {
            return Err(Error::InvalidPath(format!(
                "child name {name:?} must not contain '/'"
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Nested URL form: each segment percent-encoded on its own, joined with `/job/`.
    pub fn encode(&self) -> String {
        self.segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }
}

impl fmt::Display for JobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl std::str::FromStr for JobPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for JobPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for JobPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
