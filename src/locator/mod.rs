//! Selector resolution across frames
//!
//! Selectors are XPath (optionally `xpath=`-prefixed) or CSS. An XPath may
//! walk through `iframe` steps, and any selector may be chained with `>>`, where
//! every segment but the last names an iframe element to enter.

pub mod resolve;

pub use resolve::{
    ElementHandle, FrameHop, backend_node_of, child_frame_hosted_by, release_element, resolve_frame_hops,
    resolve_in_frame, resolve_locator, resolve_locator_from,
};

use crate::dom::xpath::NestingScanner;
use crate::error::{BrowserError, Result};

/// Split a chained selector at every `>>` that is outside quotes and predicates
pub fn split_hops(selector: &str) -> Vec<&str> {
    let mut scanner = NestingScanner::default();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pending: Option<usize> = None;

    for (i, ch) in selector.char_indices() {
        let bare = scanner.step(ch);
        match (bare && ch == '>', pending) {
            (true, Some(first)) if first + 1 == i => {
                segments.push(selector[start..first].trim());
                start = i + 1;
                pending = None;
            }
            (true, _) => pending = Some(i),
            (false, _) => pending = None,
        }
    }
    segments.push(selector[start..].trim());
    segments
}

/// Selector evaluated inside a single document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSelector {
    XPath(String),
    Css(String),
}

impl LocalSelector {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(rest) = strip_prefix_ignore_case(raw, "xpath=") {
            return Self::non_empty(normalize_xpath(rest), LocalSelector::XPath);
        }
        if let Some(rest) = strip_prefix_ignore_case(raw, "css=") {
            return Self::non_empty(rest.trim().to_string(), LocalSelector::Css);
        }
        if raw.starts_with('/') || raw.starts_with("(") {
            return Self::non_empty(normalize_xpath(raw), LocalSelector::XPath);
        }
        Self::non_empty(raw.to_string(), LocalSelector::Css)
    }

    fn non_empty(value: String, make: fn(String) -> Self) -> Result<Self> {
        if value.is_empty() {
            Err(BrowserError::InvalidSelector("empty selector".into()))
        } else {
            Ok(make(value))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LocalSelector::XPath(s) | LocalSelector::Css(s) => s,
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn normalize_xpath(path: &str) -> String {
    match path.trim() {
        "/" => "/html".to_string(),
        other => other.to_string(),
    }
}

/// Strip an `xpath=` prefix and map the bare root `/` to `/html`
pub fn normalize_selector(raw: &str) -> String {
    let raw = raw.trim();
    match strip_prefix_ignore_case(raw, "xpath=") {
        Some(rest) => normalize_xpath(rest),
        None => normalize_xpath(raw),
    }
}
