//! Fetching a complete DOM tree from one session.
//!
//! Very deep documents overflow the protocol's serializer when requested at
//! unlimited depth. The fetcher then steps down through a list of shallower
//! depths and afterwards expands every truncated node individually.

use crate::error::{BrowserError, Result};
use crate::protocol::{BackendNodeId, Cdp, DomNode, NodeTarget};
use serde::{Deserialize, Serialize};

/// Depths tried, in order, after an unlimited fetch overflows
pub const DEFAULT_DEPTH_FALLBACKS: [i64; 9] = [256, 128, 64, 32, 16, 8, 4, 2, 1];

/// DOM fetch tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomFetchConfig {
    /// Must be strictly decreasing and end at 1
    pub depth_fallbacks: Vec<i64>,

    /// Pierce shadow roots and iframe documents
    pub pierce: bool,
}

impl Default for DomFetchConfig {
    fn default() -> Self {
        Self {
            depth_fallbacks: DEFAULT_DEPTH_FALLBACKS.to_vec(),
            pierce: true,
        }
    }
}

impl DomFetchConfig {
    pub fn with_depth_fallbacks(mut self, depths: Vec<i64>) -> Self {
        self.depth_fallbacks = depths;
        self
    }

    pub fn with_pierce(mut self, pierce: bool) -> Self {
        self.pierce = pierce;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.depth_fallbacks.is_empty()
            && self.depth_fallbacks.windows(2).all(|w| w[0] > w[1])
            && self.depth_fallbacks.last() == Some(&1)
    }

    /// Fallback depths to use, replacing an invalid list with the defaults
    pub fn effective_depths(&self) -> Vec<i64> {
        if self.is_valid() {
            self.depth_fallbacks.clone()
        } else {
            log::warn!(
                "Invalid depth fallback list {:?}, using {:?}",
                self.depth_fallbacks,
                DEFAULT_DEPTH_FALLBACKS
            );
            DEFAULT_DEPTH_FALLBACKS.to_vec()
        }
    }
}

fn attempt_depths(config: &DomFetchConfig) -> Vec<i64> {
    std::iter::once(-1).chain(config.effective_depths()).collect()
}

/// Fetch the session's document, falling back to shallower depths on
/// serializer overflow, then hydrate every truncated subtree.
pub fn get_dom_tree_with_fallback(cdp: &Cdp<'_>, config: &DomFetchConfig) -> Result<DomNode> {
    let mut last_error = None;

    for depth in attempt_depths(config) {
        match cdp.get_document(depth, config.pierce) {
            Ok(mut root) => {
                if depth != -1 {
                    log::debug!("DOM.getDocument succeeded at depth {} on session {}", depth, cdp.session_id());
                }
                hydrate_dom_tree(cdp, &mut root, config)?;
                return Ok(root);
            }
            Err(e) if e.is_depth_overflow() => {
                log::debug!("DOM.getDocument overflowed at depth {}: {}", depth, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| BrowserError::DomParseFailed("DOM.getDocument returned nothing".into())))
}

/// Expand every node whose children were truncated, walking the tree with an
/// explicit stack.
pub fn hydrate_dom_tree(cdp: &Cdp<'_>, root: &mut DomNode, config: &DomFetchConfig) -> Result<()> {
    let mut expanded = 0usize;
    let mut stack: Vec<&mut DomNode> = vec![root];

    while let Some(node) = stack.pop() {
        if node.should_expand() {
            let full = describe_node_with_fallback(cdp, node.backend_node_id, config)?;
            node.child_node_count = full.child_node_count.or(node.child_node_count);
            node.children = full.children;
            if full.shadow_roots.is_some() {
                node.shadow_roots = full.shadow_roots;
            }
            if full.content_document.is_some() {
                node.content_document = full.content_document;
            }
            expanded += 1;
        }

        let DomNode {
            children,
            shadow_roots,
            content_document,
            ..
        } = node;
        if let Some(doc) = content_document {
            stack.push(doc);
        }
        if let Some(roots) = shadow_roots {
            stack.extend(roots.iter_mut());
        }
        if let Some(kids) = children {
            stack.extend(kids.iter_mut());
        }
    }

    if expanded > 0 {
        log::debug!("Hydrated {} truncated DOM nodes", expanded);
    }
    Ok(())
}

fn describe_node_with_fallback(cdp: &Cdp<'_>, backend_node_id: BackendNodeId, config: &DomFetchConfig) -> Result<DomNode> {
    let target = NodeTarget::Backend(backend_node_id);
    let mut last_reason = String::from("no depth attempted");

    for depth in attempt_depths(config) {
        match cdp.describe_node(&target, depth, config.pierce) {
            Ok(node) => return Ok(node),
            Err(e) if e.is_depth_overflow() => last_reason = e.to_string(),
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => {
                return Err(BrowserError::NodeExpansionFailed {
                    backend_node_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(BrowserError::NodeExpansionFailed {
        backend_node_id,
        reason: last_reason,
    })
}
