//! Per-session DOM index.
//!
//! One walk over a session's DOM records, for every node, its absolute XPath,
//! its tag, whether it scrolls, and which document (main document or an iframe
//! content document) it belongs to. Frames are later sliced out by document
//! root.
//!
//! Document and shadow-root nodes are indexed but never get a path in a slice:
//! their XPath is their host's (or `/`), which resolves to a different node.

use super::encoded_id::EncodedId;
use super::fetch::{DomFetchConfig, get_dom_tree_with_fallback};
use super::xpath::{child_xpath_segments, join_xpath, relativize_xpath};
use crate::error::Result;
use crate::protocol::types::{DOCUMENT_FRAGMENT_NODE, DOCUMENT_NODE};
use crate::protocol::{BackendNodeId, Cdp, DomNode};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// DOM facts for every node reachable from one session's document
#[derive(Debug, Clone, Default)]
pub struct SessionDomIndex {
    root_backend: BackendNodeId,
    absolute_xpaths: IndexMap<BackendNodeId, String>,
    tags: HashMap<BackendNodeId, String>,
    scrollable: HashSet<BackendNodeId>,
    containers: HashSet<BackendNodeId>,
    doc_root_of: HashMap<BackendNodeId, BackendNodeId>,
    content_doc_root_by_iframe: HashMap<BackendNodeId, BackendNodeId>,
}

/// One frame's slice of a [`SessionDomIndex`], keyed by encoded id with
/// document-relative paths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDomMaps {
    pub xpaths: IndexMap<EncodedId, String>,
    pub tags: HashMap<EncodedId, String>,
    pub scrollable: HashSet<EncodedId>,
}

impl FrameDomMaps {
    pub fn tag(&self, id: &EncodedId) -> Option<&str> {
        self.tags.get(id).map(String::as_str)
    }

    pub fn is_scrollable(&self, id: &EncodedId) -> bool {
        self.scrollable.contains(id)
    }
}

/// Fetch the session's DOM (with depth fallback) and index it
pub fn build_session_dom_index(cdp: &Cdp<'_>, config: &DomFetchConfig) -> Result<SessionDomIndex> {
    let root = get_dom_tree_with_fallback(cdp, config)?;
    let index = SessionDomIndex::from_root(&root);
    log::debug!(
        "Indexed {} DOM nodes on session {}",
        index.absolute_xpaths.len(),
        cdp.session_id()
    );
    Ok(index)
}

impl SessionDomIndex {
    /// Walk a fully hydrated tree
    pub fn from_root(root: &DomNode) -> Self {
        let mut index = Self {
            root_backend: root.backend_node_id,
            ..Default::default()
        };
        let mut visited: HashSet<BackendNodeId> = HashSet::new();
        // (node, absolute xpath, owning document root)
        let mut stack: Vec<(&DomNode, String, BackendNodeId)> = vec![(root, "/".to_string(), root.backend_node_id)];

        while let Some((node, xpath, doc_root)) = stack.pop() {
            let id = node.backend_node_id;
            if id != 0 && !visited.insert(id) {
                continue;
            }
            if id != 0 {
                index.absolute_xpaths.insert(id, xpath.clone());
                index.tags.insert(id, node.tag());
                index.doc_root_of.insert(id, doc_root);
                if node.is_scrollable == Some(true) {
                    index.scrollable.insert(id);
                }
                if matches!(node.node_type, DOCUMENT_NODE | DOCUMENT_FRAGMENT_NODE) {
                    index.containers.insert(id);
                }
            }

            // pushed in reverse so the walk (and map order) follows document order
            if let Some(doc) = node.content_document.as_deref() {
                index.content_doc_root_by_iframe.insert(id, doc.backend_node_id);
                stack.push((doc, xpath.clone(), doc.backend_node_id));
            }

            if let Some(roots) = &node.shadow_roots {
                let host = join_xpath(&xpath, "//");
                for shadow in roots.iter().rev() {
                    stack.push((shadow, host.clone(), doc_root));
                }
            }

            if let Some(kids) = &node.children {
                let segments = child_xpath_segments(kids);
                for (kid, segment) in kids.iter().zip(segments).rev() {
                    stack.push((kid, join_xpath(&xpath, &segment), doc_root));
                }
            }
        }
        index
    }

    /// Backend id of the session's top document
    pub fn root_backend(&self) -> BackendNodeId {
        self.root_backend
    }

    pub fn len(&self) -> usize {
        self.absolute_xpaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.absolute_xpaths.is_empty()
    }

    pub fn absolute_xpath(&self, id: BackendNodeId) -> Option<&str> {
        self.absolute_xpaths.get(&id).map(String::as_str)
    }

    pub fn tag(&self, id: BackendNodeId) -> Option<&str> {
        self.tags.get(&id).map(String::as_str)
    }

    pub fn is_scrollable(&self, id: BackendNodeId) -> bool {
        self.scrollable.contains(&id)
    }

    /// False for document and shadow-root nodes, which no XPath selects
    pub fn is_addressable(&self, id: BackendNodeId) -> bool {
        self.absolute_xpaths.contains_key(&id) && !self.containers.contains(&id)
    }

    pub fn doc_root_of(&self, id: BackendNodeId) -> Option<BackendNodeId> {
        self.doc_root_of.get(&id).copied()
    }

    /// Content-document root hosted by an `<iframe>` element
    pub fn content_document_of(&self, iframe: BackendNodeId) -> Option<BackendNodeId> {
        self.content_doc_root_by_iframe.get(&iframe).copied()
    }

    /// Nodes of the document rooted at `doc_root`, with paths relative to it
    pub fn slice_for_document(&self, doc_root: BackendNodeId, frame_ordinal: usize) -> FrameDomMaps {
        let mut maps = FrameDomMaps::default();
        let Some(root_abs) = self.absolute_xpaths.get(&doc_root) else {
            return maps;
        };

        for (&id, abs) in &self.absolute_xpaths {
            if self.doc_root_of.get(&id) != Some(&doc_root) {
                continue;
            }
            let enc = EncodedId::new(frame_ordinal, id);
            if !self.containers.contains(&id) {
                maps.xpaths.insert(enc, relativize_xpath(root_abs, abs));
            }
            if let Some(tag) = self.tags.get(&id) {
                maps.tags.insert(enc, tag.clone());
            }
            if self.scrollable.contains(&id) {
                maps.scrollable.insert(enc);
            }
        }
        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Deadline;
    use crate::protocol::testing::ScriptedSession;
    use serde_json::json;

    fn nested_iframe_document() -> DomNode {
        serde_json::from_value(json!({
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML", "localName": "html",
                "isScrollable": true,
                "children": [{
                    "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "BODY", "localName": "body",
                    "children": [
                        { "nodeId": 5, "backendNodeId": 5, "nodeType": 1, "nodeName": "H1", "localName": "h1" },
                        {
                            "nodeId": 4, "backendNodeId": 4, "nodeType": 1, "nodeName": "IFRAME", "localName": "iframe",
                            "frameId": "F1",
                            "contentDocument": {
                                "nodeId": 10, "backendNodeId": 10, "nodeType": 9, "nodeName": "#document",
                                "children": [{
                                    "nodeId": 11, "backendNodeId": 11, "nodeType": 1, "nodeName": "HTML", "localName": "html",
                                    "children": [{
                                        "nodeId": 12, "backendNodeId": 12, "nodeType": 1, "nodeName": "BODY", "localName": "body",
                                        "children": [{
                                            "nodeId": 13, "backendNodeId": 13, "nodeType": 1, "nodeName": "BUTTON", "localName": "button",
                                            "children": [{ "nodeId": 14, "backendNodeId": 14, "nodeType": 3, "nodeName": "#text", "nodeValue": "Submit" }]
                                        }]
                                    }]
                                }]
                            }
                        }
                    ]
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_records_paths_across_iframe_boundary() {
        let index = SessionDomIndex::from_root(&nested_iframe_document());

        assert_eq!(index.absolute_xpath(1), Some("/"));
        assert_eq!(index.absolute_xpath(4), Some("/html[1]/body[1]/iframe[1]"));
        assert_eq!(index.absolute_xpath(10), Some("/html[1]/body[1]/iframe[1]"));
        assert_eq!(
            index.absolute_xpath(13),
            Some("/html[1]/body[1]/iframe[1]/html[1]/body[1]/button[1]")
        );
        assert_eq!(index.content_document_of(4), Some(10));
        assert_eq!(index.doc_root_of(13), Some(10));
        assert_eq!(index.doc_root_of(5), Some(1));
        assert!(index.is_scrollable(2));
        assert_eq!(index.tag(14), Some("#text"));
    }

    #[test]
    fn test_slices_are_disjoint_and_relative() {
        let index = SessionDomIndex::from_root(&nested_iframe_document());
        let top = index.slice_for_document(1, 0);
        let child = index.slice_for_document(10, 1);

        assert_eq!(top.xpaths.get(&EncodedId::new(0, 4)).map(String::as_str), Some("/html[1]/body[1]/iframe[1]"));
        assert!(!top.xpaths.contains_key(&EncodedId::new(0, 13)));

        assert!(!child.xpaths.contains_key(&EncodedId::new(1, 10)));
        assert_eq!(child.tag(&EncodedId::new(1, 10)), Some("#document"));
        assert_eq!(
            child.xpaths.get(&EncodedId::new(1, 13)).map(String::as_str),
            Some("/html[1]/body[1]/button[1]")
        );
        assert_eq!(
            child.xpaths.get(&EncodedId::new(1, 14)).map(String::as_str),
            Some("/html[1]/body[1]/button[1]/text()[1]")
        );
        // both #document nodes are left out
        assert_eq!(top.xpaths.len() + child.xpaths.len(), index.len() - 2);
        assert!(!top.xpaths.contains_key(&EncodedId::new(0, 1)));
    }

    #[test]
    fn test_shadow_roots_use_descendant_hop() {
        let root: DomNode = serde_json::from_value(json!({
            "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "children": [{
                "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML", "localName": "html",
                "children": [{
                    "backendNodeId": 3, "nodeType": 1, "nodeName": "X-CARD", "localName": "x-card",
                    "shadowRoots": [{
                        "backendNodeId": 4, "nodeType": 11, "nodeName": "#document-fragment",
                        "children": [{ "backendNodeId": 5, "nodeType": 1, "nodeName": "SPAN", "localName": "span" }]
                    }]
                }]
            }]
        }))
        .unwrap();
        let index = SessionDomIndex::from_root(&root);

        assert_eq!(index.absolute_xpath(5), Some("/html[1]/x-card[1]//span[1]"));
        assert_eq!(index.doc_root_of(5), Some(1));
        assert!(!index.is_addressable(4));
        assert!(index.is_addressable(5));

        let slice = index.slice_for_document(1, 0);
        assert!(!slice.xpaths.contains_key(&EncodedId::new(0, 4)));
        assert_eq!(slice.xpaths.get(&EncodedId::new(0, 5)).map(String::as_str), Some("/html[1]/x-card[1]//span[1]"));
    }

    #[test]
    fn test_build_from_session() {
        let doc = serde_json::to_value(nested_iframe_document()).unwrap();
        let session = ScriptedSession::new("s1").on_value("DOM.getDocument", json!({ "root": doc }));
        let deadline = Deadline::unbounded("test");
        let index = build_session_dom_index(&Cdp::new(&session, &deadline), &DomFetchConfig::default()).unwrap();

        assert_eq!(index.root_backend(), 1);
        assert_eq!(index.len(), 10);
    }
}
