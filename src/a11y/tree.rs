//! Accessibility node decoration, hierarchy, pruning and outline text.
//!
//! All walks use explicit stacks; page depth never touches the call stack.

use crate::dom::{EncodedId, FrameDomMaps};
use crate::protocol::{AxNode, BackendNodeId};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Decorated accessibility node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityNode {
    pub node_id: String,
    pub role: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_id: Option<EncodedId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_dom_node_id: Option<BackendNodeId>,

    /// `url` property (links, images)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip)]
    pub parent_id: Option<String>,

    #[serde(skip)]
    pub child_ids: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AccessibilityNode>,
}

impl AccessibilityNode {
    pub fn new(node_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_children(mut self, children: Vec<AccessibilityNode>) -> Self {
        self.children = children;
        self
    }

    fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Label shown in the outline: encoded id when known, AX node id otherwise
    pub fn label(&self) -> String {
        match self.encoded_id {
            Some(id) => id.to_string(),
            None => self.node_id.clone(),
        }
    }
}

/// Roles that carry no meaning of their own
pub fn is_structural(role: &str) -> bool {
    matches!(role.to_ascii_lowercase().as_str(), "generic" | "none" | "inlinetextbox")
}

/// Collapse whitespace, drop private-use glyphs (icon fonts) and trim
pub fn clean_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !('\u{E000}'..='\u{F8FF}').contains(c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| clean_text(&t)).filter(|t| !t.is_empty())
}

/// Attach encoded ids and mark scrollable containers in the role text
pub fn decorate_roles(nodes: &[AxNode], dom: &FrameDomMaps, frame_ordinal: usize) -> Vec<AccessibilityNode> {
    nodes
        .iter()
        .map(|ax| {
            let encoded_id = ax.backend_dom_node_id.map(|be| EncodedId::new(frame_ordinal, be));
            let mut role = ax.role.as_ref().and_then(|r| r.text()).unwrap_or_default();

            let tag = encoded_id.as_ref().and_then(|id| dom.tag(id).map(|t| (id, t)));
            if let Some((id, tag)) = tag {
                if tag != "#document" && (dom.is_scrollable(id) || tag == "html") {
                    role = format!("scrollable, {}", tag);
                }
            }

            AccessibilityNode {
                node_id: ax.node_id.clone(),
                role,
                name: non_empty(ax.name.as_ref().and_then(|v| v.text())),
                description: non_empty(ax.description.as_ref().and_then(|v| v.text())),
                value: non_empty(ax.value.as_ref().and_then(|v| v.text())),
                encoded_id,
                backend_dom_node_id: ax.backend_dom_node_id,
                url: ax.property("url").and_then(|v| v.text()).filter(|u| !u.is_empty()),
                parent_id: ax.parent_id.clone(),
                child_ids: ax.child_ids.clone().unwrap_or_default(),
                children: Vec::new(),
            }
        })
        .collect()
}

/// Restrict a flat node list to the subtree rooted at the node backed by
/// `backend_node_id`. Returns `None` when no node is backed by it.
pub fn scope_to_subtree(nodes: &[AccessibilityNode], backend_node_id: BackendNodeId) -> Option<Vec<AccessibilityNode>> {
    let target = nodes.iter().find(|n| n.backend_dom_node_id == Some(backend_node_id))?;
    let by_id: HashMap<&str, &AccessibilityNode> = nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

    let mut keep: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([target.node_id.as_str()]);
    while let Some(id) = queue.pop_front() {
        if !keep.insert(id) {
            continue;
        }
        if let Some(node) = by_id.get(id) {
            queue.extend(node.child_ids.iter().map(String::as_str));
        }
    }

    let scoped = nodes
        .iter()
        .filter(|n| keep.contains(n.node_id.as_str()))
        .map(|n| {
            let mut n = n.clone();
            if n.node_id == target.node_id {
                n.parent_id = None;
            }
            n
        })
        .collect();
    Some(scoped)
}

enum Visit<T> {
    Enter(T),
    Exit(AccessibilityNode, usize),
}

/// Assemble flat nodes into trees and prune them
pub fn build_hierarchical_tree(nodes: Vec<AccessibilityNode>) -> Vec<AccessibilityNode> {
    let present: HashSet<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    let root_ids: Vec<String> = nodes
        .iter()
        .filter(|n| n.parent_id.as_ref().is_none_or(|p| !present.contains(p)))
        .map(|n| n.node_id.clone())
        .collect();
    let mut by_id: HashMap<String, AccessibilityNode> = nodes.into_iter().map(|n| (n.node_id.clone(), n)).collect();

    let mut roots = Vec::new();
    for root_id in root_ids {
        let mut results: Vec<AccessibilityNode> = Vec::new();
        let mut work = vec![Visit::Enter(root_id)];

        while let Some(visit) = work.pop() {
            match visit {
                Visit::Enter(id) => {
                    // a node already claimed by another parent (or a cycle) is skipped
                    let Some(node) = by_id.remove(&id) else { continue };
                    let kids = node.child_ids.clone();
                    work.push(Visit::Exit(node, results.len()));
                    work.extend(kids.into_iter().rev().map(Visit::Enter));
                }
                Visit::Exit(mut node, start) => {
                    node.children = results.split_off(start);
                    results.push(node);
                }
            }
        }
        roots.extend(results);
    }

    prune_forest(roots)
}

pub fn prune_forest(roots: Vec<AccessibilityNode>) -> Vec<AccessibilityNode> {
    roots.into_iter().filter_map(prune_tree).collect()
}

/// Remove structural noise bottom-up. Idempotent.
pub fn prune_tree(root: AccessibilityNode) -> Option<AccessibilityNode> {
    let mut results: Vec<AccessibilityNode> = Vec::new();
    let mut work = vec![Visit::Enter(root)];

    while let Some(visit) = work.pop() {
        match visit {
            Visit::Enter(mut node) => {
                let kids = std::mem::take(&mut node.children);
                work.push(Visit::Exit(node, results.len()));
                work.extend(kids.into_iter().rev().map(Visit::Enter));
            }
            Visit::Exit(node, start) => {
                let kids = results.split_off(start);
                if let Some(pruned) = prune_node(node, kids) {
                    results.push(pruned);
                }
            }
        }
    }
    results.pop()
}

fn prune_node(mut node: AccessibilityNode, kids: Vec<AccessibilityNode>) -> Option<AccessibilityNode> {
    let mut kids = remove_redundant_static_text(&node, kids);

    if is_structural(&node.role) {
        if kids.len() == 1 {
            return kids.pop();
        }
        if kids.is_empty() && !node.has_name() {
            return None;
        }
    }
    node.children = kids;
    Some(node)
}

/// Drop `StaticText` children that only repeat the parent's name
fn remove_redundant_static_text(parent: &AccessibilityNode, kids: Vec<AccessibilityNode>) -> Vec<AccessibilityNode> {
    let Some(name) = parent.name.as_deref().filter(|n| !n.is_empty()) else {
        return kids;
    };
    let combined: String = kids
        .iter()
        .filter(|k| k.role == "StaticText")
        .filter_map(|k| k.name.as_deref())
        .collect();
    if !combined.is_empty() && clean_text(&combined) == clean_text(name) {
        kids.into_iter().filter(|k| k.role != "StaticText").collect()
    } else {
        kids
    }
}

/// `[id] role: name` lines, two spaces of indent per level
pub fn format_outline(roots: &[AccessibilityNode]) -> String {
    let mut lines = Vec::new();
    let mut stack: Vec<(&AccessibilityNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();

    while let Some((node, level)) = stack.pop() {
        let mut line = format!("{}[{}] {}", "  ".repeat(level), node.label(), node.role);
        if let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) {
            line.push_str(": ");
            line.push_str(name);
        }
        lines.push(line);
        stack.extend(node.children.iter().rev().map(|c| (c, level + 1)));
    }
    lines.join("\n")
}
