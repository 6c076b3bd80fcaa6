//! Case-insensitive glob matching over tree items.
//!
//! Only `*` (any run, including empty and `/`) and `?` (exactly one char) are special;
//! everything else is literal.

use crate::TreeItem;
use globset::{GlobBuilder, GlobMatcher};

/// A pattern compiled once and matched against many names.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    lowered: String,
    matcher: Option<GlobMatcher>,
}

impl WildcardPattern {
    pub fn new(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let matcher = GlobBuilder::new(&escape_glob(&lowered))
            .case_insensitive(true)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .ok()
            .map(|g| g.compile_matcher());
        if matcher.is_none() {
            tracing::debug!(pattern = raw, "glob did not compile; using literal equality");
        }
        Self { lowered, matcher }
    }

    pub fn is_match(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        match &self.matcher {
            Some(m) => m.is_match(text.as_str()),
            None => text == self.lowered,
        }
    }

    /// The item's name or full path matches.
    pub fn matches_item(&self, item: &TreeItem) -> bool {
        self.is_match(&item.name) || self.is_match(&item.full_name)
    }
}

/// Escape unsupported glob syntax and collapse `*` runs (`**` is plain `*` here).
fn escape_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '[' | ']' | '{' | '}' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '*' if out.ends_with('*') => {}
            _ => out.push(c),
        }
    }
    out
}

pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    WildcardPattern::new(pattern).is_match(text)
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Pattern search: the item's name or full path matches the glob.
pub fn item_matches(pattern: &WildcardPattern, item: &TreeItem) -> bool {
    pattern.matches_item(item)
}

/// Fallback lookup: glob match, or plain substring containment on name or full path.
///
/// Substring containment catches partial names that are not useful globs (`deploy`
/// finds `team/deploy-prod`).
pub fn item_matches_loosely(pattern: &WildcardPattern, item: &TreeItem) -> bool {
    pattern.matches_item(item)
        || contains_ignore_case(&item.name, &pattern.lowered)
        || contains_ignore_case(&item.full_name, &pattern.lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemKind;
    use proptest::prelude::*;

    fn job(full: &str) -> TreeItem {
        TreeItem {
            name: full.rsplit('/').next().unwrap_or(full).to_string(),
            full_name: full.to_string(),
            kind: ItemKind::Job,
            url: String::new(),
            description: None,
        }
    }

    #[test]
    fn star_and_question_mark() {
        assert!(wildcard_match("build*", "build-a"));
        assert!(wildcard_match("build*", "build"));
        assert!(wildcard_match("*-a", "build-a"));
        assert!(wildcard_match("b?ild-*", "build-b"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("?", ""));
        assert!(!wildcard_match("build*", "rebuild"));
        assert!(wildcard_match("*build*", "rebuild-x"));
        assert!(wildcard_match("a*b*c", "aXXbYYbc"));
        assert!(!wildcard_match("a*b*c", "aXXbYYbd"));
    }

    #[test]
    fn matching_ignores_case() {
        assert!(wildcard_match("BUILD-*", "build-A"));
        assert!(wildcard_match("deploy", "DePloy"));
    }

    #[test]
    fn literal_without_wildcards_requires_full_match() {
        assert!(wildcard_match("deploy", "deploy"));
        assert!(!wildcard_match("deploy", "deploy-prod"));
    }

    #[test]
    fn glob_syntax_beyond_star_and_question_mark_is_literal() {
        assert!(wildcard_match("build[1]", "build[1]"));
        assert!(!wildcard_match("build[12]", "build1"));
        assert!(wildcard_match("deploy-{a,b}", "deploy-{a,b}"));
        assert!(!wildcard_match("deploy-{a,b}", "deploy-a"));
        assert!(wildcard_match(r"c:\jobs", r"c:\jobs"));
        assert!(wildcard_match("release-[*]", "release-[2024]"));
    }

    #[test]
    fn star_crosses_folder_separators() {
        assert!(wildcard_match("team/*", "team/backend/deploy"));
        assert!(wildcard_match("**deploy", "team/backend/deploy"));
        assert!(wildcard_match("team?backend", "team/backend"));
    }

    #[test]
    fn compiled_pattern_is_reusable() {
        let p = WildcardPattern::new("BUILD-?");
        assert!(p.is_match("build-a"));
        assert!(p.is_match("Build-B"));
        assert!(!p.is_match("build-ab"));
    }

    #[test]
    fn item_matches_checks_name_and_full_path() {
        let it = job("team/backend/deploy");
        assert!(item_matches(&WildcardPattern::new("deploy"), &it));
        assert!(item_matches(&WildcardPattern::new("team/*"), &it));
        assert!(!item_matches(&WildcardPattern::new("backend"), &it));
    }

    #[test]
    fn loose_match_adds_substring_containment() {
        let it = job("team/backend/deploy-prod");
        assert!(!item_matches(&WildcardPattern::new("backend"), &it));
        assert!(item_matches_loosely(&WildcardPattern::new("backend"), &it));
        assert!(item_matches_loosely(&WildcardPattern::new("PROD"), &it));
        assert!(!item_matches_loosely(&WildcardPattern::new("staging"), &it));
    }

    proptest! {
        #[test]
        fn every_string_matches_itself_and_star(s in "[a-zA-Z0-9 _./-]{0,24}") {
            prop_assert!(wildcard_match(&s, &s));
            prop_assert!(wildcard_match("*", &s));
            let wrapped = format!("*{s}*");
            let expected = format!("x{s}y");
            prop_assert!(wildcard_match(&wrapped, &expected));
        }

        #[test]
        fn question_marks_match_exact_length(s in "[a-z]{0,12}") {
            let qs = "?".repeat(s.chars().count());
            prop_assert!(wildcard_match(&qs, &s));
            let more = format!("{qs}?");
            prop_assert!(!wildcard_match(&more, &s));
        }
    }
}
