//! XPath string arithmetic.
//!
//! Paths are plain positional XPath (`/html[1]/body[1]/div[2]`). A shadow-root
//! boundary is written as the descendant hop `//`, so a node inside a shadow
//! tree reads `/html[1]/body[1]/my-el[1]//div[1]`.

use crate::protocol::types::{COMMENT_NODE, DomNode, ELEMENT_NODE, TEXT_NODE};
use std::collections::HashMap;

/// Append one step (or the `//` shadow hop) to a path
pub fn join_xpath(base: &str, step: &str) -> String {
    if step == "//" {
        if base.is_empty() || base == "/" {
            return "//".to_string();
        }
        if base.ends_with('/') {
            return format!("{}/", base);
        }
        return format!("{}//", base);
    }
    if base.is_empty() || base == "/" {
        return if step.is_empty() { "/".to_string() } else { format!("/{}", step) };
    }
    if base.ends_with("//") {
        return format!("{}{}", base, step);
    }
    if step.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, step)
}

/// Resolve a document-relative path against its frame's absolute prefix
pub fn prefix_xpath(parent_abs: &str, child: &str) -> String {
    let parent = if parent_abs == "/" {
        ""
    } else {
        parent_abs.strip_suffix('/').unwrap_or(parent_abs)
    };

    if child.is_empty() || child == "/" {
        return if parent.is_empty() { "/".to_string() } else { parent.to_string() };
    }
    if child.starts_with("//") {
        return if parent.is_empty() { child.to_string() } else { format!("{}{}", parent, child) };
    }
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Express `node_abs` relative to the document rooted at `doc_root_abs`.
///
/// Inverse of [`prefix_xpath`]: `prefix_xpath(root, &relativize_xpath(root, node)) == node`
/// for every node inside that document.
pub fn relativize_xpath(doc_root_abs: &str, node_abs: &str) -> String {
    if node_abs == doc_root_abs {
        return "/".to_string();
    }
    if doc_root_abs.is_empty() || doc_root_abs == "/" {
        return node_abs.to_string();
    }
    match node_abs.strip_prefix(doc_root_abs) {
        // only at a step boundary: `/div[1]` is not a prefix of `/div[10]`
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        Some(rest) if doc_root_abs.ends_with('/') => format!("/{}", rest),
        _ => node_abs.to_string(),
    }
}

/// Positional step for every child of a node, in child order.
///
/// Indices count siblings of the same node type and tag, matching XPath's
/// `tag[n]`, `text()[n]` and `comment()[n]`.
pub fn child_xpath_segments(children: &[DomNode]) -> Vec<String> {
    let mut counts: HashMap<(i64, String), usize> = HashMap::new();
    children
        .iter()
        .map(|child| {
            let tag = child.tag();
            let n = counts.entry((child.node_type, tag.clone())).or_insert(0);
            *n += 1;
            match child.node_type {
                TEXT_NODE => format!("text()[{}]", n),
                COMMENT_NODE => format!("comment()[{}]", n),
                ELEMENT_NODE if tag.contains(':') => format!("*[name()='{}'][{}]", tag, n),
                _ => format!("{}[{}]", tag, n),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `/`
    Child,
    /// `//`
    Descendant,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Child => "/",
            Axis::Descendant => "//",
        }
    }
}

/// One location step of a selector, predicates included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathStep {
    pub axis: Axis,
    pub raw: String,
}

impl XPathStep {
    /// Lowercase node test, without predicates
    pub fn name(&self) -> String {
        let end = self.raw.find('[').unwrap_or(self.raw.len());
        self.raw[..end].trim().to_ascii_lowercase()
    }

    pub fn is_iframe(&self) -> bool {
        self.name() == "iframe"
    }
}

/// Quote and bracket state while scanning selector text left to right
#[derive(Debug, Default)]
pub(crate) struct NestingScanner {
    depth: usize,
    quote: Option<char>,
}

impl NestingScanner {
    /// Consume `ch`; true when it is a plain character outside every literal
    /// and predicate
    pub(crate) fn step(&mut self, ch: char) -> bool {
        match self.quote {
            Some(q) => {
                if ch == q {
                    self.quote = None;
                }
                false
            }
            None => match ch {
                '\'' | '"' => {
                    self.quote = Some(ch);
                    false
                }
                '[' => {
                    self.depth += 1;
                    false
                }
                ']' => {
                    self.depth = self.depth.saturating_sub(1);
                    false
                }
                _ => self.depth == 0,
            },
        }
    }
}

/// Split a path into steps. Slashes inside predicates or quotes do not split.
pub fn parse_xpath_steps(path: &str) -> Vec<XPathStep> {
    let chars: Vec<char> = path.trim().chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let axis = if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
            i += 2;
            Axis::Descendant
        } else if chars[i] == '/' {
            i += 1;
            Axis::Child
        } else {
            Axis::Child
        };

        let start = i;
        let mut scanner = NestingScanner::default();
        while i < chars.len() {
            if scanner.step(chars[i]) && chars[i] == '/' {
                break;
            }
            i += 1;
        }

        let raw: String = chars[start..i].iter().collect::<String>().trim().to_string();
        if !raw.is_empty() {
            steps.push(XPathStep { axis, raw });
        }
    }
    steps
}

/// Re-assemble steps into an absolute path (`/` when empty)
pub fn steps_to_xpath(steps: &[XPathStep]) -> String {
    if steps.is_empty() {
        return "/".to_string();
    }
    steps.iter().map(|s| format!("{}{}", s.axis.as_str(), s.raw)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str) -> DomNode {
        DomNode {
            node_type: ELEMENT_NODE,
            node_name: tag.to_uppercase(),
            local_name: tag.to_string(),
            ..Default::default()
        }
    }

    fn text() -> DomNode {
        DomNode {
            node_type: TEXT_NODE,
            node_name: "#text".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_join_xpath() {
        assert_eq!(join_xpath("/", "html[1]"), "/html[1]");
        assert_eq!(join_xpath("", "html[1]"), "/html[1]");
        assert_eq!(join_xpath("/html[1]", "body[1]"), "/html[1]/body[1]");
        assert_eq!(join_xpath("/html[1]/x-el[1]", "//"), "/html[1]/x-el[1]//");
        assert_eq!(join_xpath("/html[1]/x-el[1]//", "div[1]"), "/html[1]/x-el[1]//div[1]");
        assert_eq!(join_xpath("/", "//"), "//");
        assert_eq!(join_xpath("/html[1]", ""), "/html[1]");
    }

    #[test]
    fn test_prefix_xpath() {
        let host = "/html[1]/body[1]/iframe[1]";
        assert_eq!(prefix_xpath(host, "/html[1]/body[1]/button[1]"), "/html[1]/body[1]/iframe[1]/html[1]/body[1]/button[1]");
        assert_eq!(prefix_xpath(host, "/"), host);
        assert_eq!(prefix_xpath(host, "//div[1]"), "/html[1]/body[1]/iframe[1]//div[1]");
        assert_eq!(prefix_xpath("/", "/html[1]"), "/html[1]");
        assert_eq!(prefix_xpath("", "/html[1]"), "/html[1]");
        assert_eq!(prefix_xpath("/", "/"), "/");
    }

    #[test]
    fn test_relativize_round_trips() {
        let cases = [
            ("/", "/"),
            ("/", "/html[1]/body[1]"),
            ("/html[1]/body[1]/iframe[1]", "/html[1]/body[1]/iframe[1]"),
            ("/html[1]/body[1]/iframe[1]", "/html[1]/body[1]/iframe[1]/html[1]"),
            ("/html[1]/body[1]/iframe[1]", "/html[1]/body[1]/iframe[1]/html[1]/body[1]/x-el[1]//span[2]"),
            ("/html[1]/body[1]/x-el[1]//iframe[1]", "/html[1]/body[1]/x-el[1]//iframe[1]/html[1]/body[1]"),
        ];
        for (root, node) in cases {
            let rel = relativize_xpath(root, node);
            assert!(rel.starts_with('/'), "{} relative to {} gave {}", node, root, rel);
            assert_eq!(prefix_xpath(root, &rel), node, "round trip of {} under {}", node, root);
        }
    }

    #[test]
    fn test_relativize_respects_step_boundary() {
        assert_eq!(relativize_xpath("/div[1]", "/div[10]/span[1]"), "/div[10]/span[1]");
        assert_eq!(relativize_xpath("/div[1]", "/div[1]/span[1]"), "/span[1]");
    }

    #[test]
    fn test_child_segments_count_per_type_and_tag() {
        let children = vec![element("div"), text(), element("div"), element("span"), text(), element("svg:rect")];
        assert_eq!(
            child_xpath_segments(&children),
            vec!["div[1]", "text()[1]", "div[2]", "span[1]", "text()[2]", "*[name()='svg:rect'][1]"]
        );
    }

    #[test]
    fn test_parse_steps_keeps_predicates_intact() {
        let steps = parse_xpath_steps("/html/body//iframe[@src='a/b.html']/html[1]");
        let raws: Vec<&str> = steps.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(raws, vec!["html", "body", "iframe[@src='a/b.html']", "html[1]"]);
        assert_eq!(steps[2].axis, Axis::Descendant);
        assert!(steps[2].is_iframe());
        assert!(!steps[3].is_iframe());
    }

    #[test]
    fn test_steps_to_xpath() {
        let path = "/html[1]/body[1]//div[2]";
        assert_eq!(steps_to_xpath(&parse_xpath_steps(path)), path);
        assert_eq!(steps_to_xpath(&[]), "/");
    }
}
