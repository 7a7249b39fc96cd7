//! Per-frame accessibility outlines
//!
//! [`a11y_for_frame`] fetches a frame's accessibility tree, decorates it with
//! DOM facts from the frame's [`FrameDomMaps`], prunes it and renders the
//! outline text an agent reads.

pub mod tree;

pub use tree::{
    AccessibilityNode, build_hierarchical_tree, clean_text, decorate_roles, format_outline, prune_forest,
    prune_tree, scope_to_subtree,
};

use crate::dom::FrameDomMaps;
use crate::error::Result;
use crate::protocol::{BackendNodeId, Cdp};
use crate::snapshot::ElementMap;

/// Inputs for one frame's accessibility pass
#[derive(Debug, Clone, Copy)]
pub struct A11yOptions<'a> {
    /// Frame to fetch; `None` asks the session for its own top frame
    pub frame_id: Option<&'a str>,
    pub frame_ordinal: usize,
    pub dom: &'a FrameDomMaps,
    /// Restrict the outline to the subtree of this element
    pub focus_backend_node: Option<BackendNodeId>,
}

/// Outline and URL map for one frame
#[derive(Debug, Clone, Default)]
pub struct FrameAccessibility {
    pub outline: String,
    pub url_map: ElementMap,
    pub tree: Vec<AccessibilityNode>,
    /// Whether `focus_backend_node` actually narrowed the tree
    pub scope_applied: bool,
}

pub fn a11y_for_frame(cdp: &Cdp<'_>, options: &A11yOptions<'_>) -> Result<FrameAccessibility> {
    let raw = match cdp.get_full_ax_tree(options.frame_id) {
        Ok(nodes) => nodes,
        // an OOPIF session owns its frame but rejects the frame id
        Err(e) if options.frame_id.is_some() && e.is_out_of_target() => {
            log::debug!("Frame-scoped AX fetch rejected ({}), retrying unscoped", e);
            cdp.get_full_ax_tree(None)?
        }
        Err(e) => return Err(e),
    };

    let mut nodes = decorate_roles(&raw, options.dom, options.frame_ordinal);

    let mut scope_applied = false;
    if let Some(backend) = options.focus_backend_node {
        match scope_to_subtree(&nodes, backend) {
            Some(scoped) => {
                nodes = scoped;
                scope_applied = true;
            }
            None => log::debug!("No accessibility node backs element {}, outline not scoped", backend),
        }
    }

    let mut url_map = ElementMap::new();
    for node in &nodes {
        if let (Some(id), Some(url)) = (node.encoded_id, node.url.as_deref()) {
            url_map.insert(id, url);
        }
    }

    let tree = build_hierarchical_tree(nodes);
    Ok(FrameAccessibility {
        outline: format_outline(&tree),
        url_map,
        tree,
        scope_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::EncodedId;
    use crate::error::BrowserError;
    use crate::protocol::Deadline;
    use crate::protocol::testing::ScriptedSession;
    use serde_json::{Value, json};

    fn ax_nodes() -> Value {
        json!({ "nodes": [
            { "nodeId": "1", "role": { "type": "role", "value": "RootWebArea" }, "backendDOMNodeId": 1, "childIds": ["2", "3"] },
            { "nodeId": "2", "role": { "type": "role", "value": "link" }, "name": { "type": "computedString", "value": "Docs" },
              "backendDOMNodeId": 7, "parentId": "1",
              "properties": [{ "name": "url", "value": { "type": "string", "value": "https://example.com/docs" } }] },
            { "nodeId": "3", "role": { "type": "role", "value": "button" }, "name": { "type": "computedString", "value": "Go" },
              "backendDOMNodeId": 8, "parentId": "1" }
        ]})
    }

    #[test]
    fn test_outline_and_url_map() {
        let session = ScriptedSession::new("s1").on_value("Accessibility.getFullAXTree", ax_nodes());
        let deadline = Deadline::unbounded("test");
        let dom = FrameDomMaps::default();
        let options = A11yOptions {
            frame_id: Some("F0"),
            frame_ordinal: 0,
            dom: &dom,
            focus_backend_node: None,
        };

        let out = a11y_for_frame(&Cdp::new(&session, &deadline), &options).unwrap();
        assert_eq!(out.outline, "[0-1] RootWebArea\n  [0-7] link: Docs\n  [0-8] button: Go");
        assert_eq!(out.url_map.get(&EncodedId::new(0, 7)), Some("https://example.com/docs"));
        assert!(!out.scope_applied);
    }

    #[test]
    fn test_out_of_target_retries_unscoped() {
        let session = ScriptedSession::new("oopif").on("Accessibility.getFullAXTree", |params| {
            if params.get("frameId").is_some() {
                Err(BrowserError::protocol("Accessibility.getFullAXTree", "Frame with the given id does not belong to the target."))
            } else {
                Ok(ax_nodes())
            }
        });
        let deadline = Deadline::unbounded("test");
        let dom = FrameDomMaps::default();
        let options = A11yOptions {
            frame_id: Some("F3"),
            frame_ordinal: 3,
            dom: &dom,
            focus_backend_node: None,
        };

        let out = a11y_for_frame(&Cdp::new(&session, &deadline), &options).unwrap();
        assert!(out.outline.starts_with("[3-1] RootWebArea"));
        assert_eq!(session.call_count("Accessibility.getFullAXTree"), 2);
    }

    #[test]
    fn test_focus_scopes_outline() {
        let session = ScriptedSession::new("s1").on_value("Accessibility.getFullAXTree", ax_nodes());
        let deadline = Deadline::unbounded("test");
        let dom = FrameDomMaps::default();
        let options = A11yOptions {
            frame_id: Some("F0"),
            frame_ordinal: 0,
            dom: &dom,
            focus_backend_node: Some(8),
        };

        let out = a11y_for_frame(&Cdp::new(&session, &deadline), &options).unwrap();
        assert!(out.scope_applied);
        assert_eq!(out.outline, "[0-8] button: Go");
        assert!(out.url_map.is_empty());
    }
}
