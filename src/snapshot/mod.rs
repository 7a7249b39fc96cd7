//! Hybrid snapshots
//!
//! A hybrid snapshot pairs the page's accessibility outline with DOM-derived
//! element maps, across every frame:
//!
//! 1. a focus selector, when given, is tried first and scopes the outline to one
//!    subtree;
//! 2. otherwise every session's DOM is indexed once;
//! 3. each frame gets its own slice of its session's index and its own outline;
//! 4. frames are placed (host iframe and absolute prefix) breadth-first;
//! 5. maps are merged with absolute paths and child outlines are injected
//!    under their host iframe lines.

pub mod focus;
pub mod maps;
pub mod merge;

pub use maps::ElementMap;
pub use merge::{FramePlacement, compute_frame_placements, inject_subtrees};

use crate::a11y::{A11yOptions, a11y_for_frame};
use crate::dom::xpath::prefix_xpath;
use crate::dom::{DomFetchConfig, FrameDomMaps, SessionDomIndex, build_session_dom_index};
use crate::error::Result;
use crate::page::Page;
use crate::protocol::{BackendNodeId, Cdp, Deadline};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot configuration
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Scope the outline to the element this selector resolves to
    pub focus_selector: Option<String>,

    /// Budget for the whole capture; `None` is unbounded
    pub timeout: Option<Duration>,

    pub dom: DomFetchConfig,
}

impl SnapshotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(mut self, selector: impl Into<String>) -> Self {
        self.focus_selector = Some(selector.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn dom(mut self, dom: DomFetchConfig) -> Self {
        self.dom = dom;
        self
    }
}

/// One frame's contribution to a snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub frame_id: String,
    pub frame_ordinal: usize,
    pub session_id: String,
    pub outline: String,
    /// Paths relative to the frame's own document
    pub xpath_map: ElementMap,
    pub url_map: ElementMap,
    /// Absolute XPath of the hosting iframe; empty for the main frame
    pub absolute_prefix: String,
}

/// Page-wide snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSnapshot {
    pub combined_tree: String,
    /// Absolute paths from the top document
    pub combined_xpath_map: ElementMap,
    pub combined_url_map: ElementMap,
    pub per_frame: Vec<FrameSnapshot>,
}

impl HybridSnapshot {
    pub fn frame(&self, frame_id: &str) -> Option<&FrameSnapshot> {
        self.per_frame.iter().find(|f| f.frame_id == frame_id)
    }
}

/// Capture a snapshot of every frame of `page`
pub fn capture_hybrid_snapshot(page: &Page, options: &SnapshotOptions) -> Result<HybridSnapshot> {
    let deadline = Deadline::new("snapshot", options.timeout);
    capture_with_deadline(page, options, &deadline)
}

/// Same as [`capture_hybrid_snapshot`], charging an existing budget
pub fn capture_with_deadline(page: &Page, options: &SnapshotOptions, deadline: &Deadline) -> Result<HybridSnapshot> {
    if let Some(selector) = options.focus_selector.as_deref().filter(|s| !s.trim().is_empty()) {
        match focus::try_scoped_snapshot(page, selector, options, deadline) {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => log::warn!("Focus selector '{}' did not scope the tree, capturing full snapshot", selector),
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => log::warn!("Scoped snapshot for '{}' failed ({}), capturing full snapshot", selector, e),
        }
    }

    let frames = page.registry().list_all_frames();
    let main = page.main_frame_id().to_string();

    let mut indexes: HashMap<String, SessionDomIndex> = HashMap::new();
    for frame in &frames {
        let session = page.session_for_frame(frame);
        if indexes.contains_key(session.id()) {
            continue;
        }
        let index = build_session_dom_index(&Cdp::new(session, deadline), &options.dom)?;
        indexes.insert(session.id().to_string(), index);
    }

    let mut per_frame: HashMap<String, FrameSnapshot> = HashMap::new();
    for frame in &frames {
        match snapshot_frame(page, frame, &indexes, deadline) {
            Ok(snapshot) => {
                per_frame.insert(frame.clone(), snapshot);
            }
            Err(e) if e.is_timeout() || *frame == main => return Err(e),
            Err(e) => log::warn!("Skipping frame {}: {}", frame, e),
        }
    }

    let placements = compute_frame_placements(page, &per_frame, deadline)?;

    let mut combined_xpath_map = ElementMap::new();
    let mut combined_url_map = ElementMap::new();
    let mut subtrees = HashMap::new();
    let mut ordered = Vec::with_capacity(per_frame.len());

    for frame in &frames {
        let Some(mut snapshot) = per_frame.remove(frame) else { continue };
        let placement = placements.get(frame).cloned().unwrap_or_default();

        for (id, local) in snapshot.xpath_map.iter() {
            if *frame == main {
                combined_xpath_map.insert(*id, local);
            } else {
                combined_xpath_map.insert(*id, prefix_xpath(&placement.absolute_prefix, local));
            }
        }
        combined_url_map.extend(&snapshot.url_map);

        if *frame != main {
            match placement.host {
                Some(host) => {
                    subtrees.insert(host, snapshot.outline.clone());
                }
                None => log::debug!("Frame {} has no resolvable host, outline not injected", frame),
            }
        }
        snapshot.absolute_prefix = placement.absolute_prefix;
        ordered.push(snapshot);
    }

    let root_outline = ordered
        .iter()
        .find(|s| s.frame_id == main)
        .map(|s| s.outline.as_str())
        .unwrap_or_default();
    let combined_tree = inject_subtrees(root_outline, &subtrees);

    log::debug!(
        "Captured snapshot: {} frame(s), {} addressable element(s)",
        ordered.len(),
        combined_xpath_map.len()
    );
    Ok(HybridSnapshot {
        combined_tree,
        combined_xpath_map,
        combined_url_map,
        per_frame: ordered,
    })
}

fn snapshot_frame(
    page: &Page,
    frame: &str,
    indexes: &HashMap<String, SessionDomIndex>,
    deadline: &Deadline,
) -> Result<FrameSnapshot> {
    let session = page.session_for_frame(frame);
    let cdp = Cdp::new(session, deadline);
    let ordinal = page.frame_ordinal(frame);

    let dom = match indexes.get(session.id()) {
        Some(index) => match frame_document_root(page, frame, index, &cdp)? {
            Some(root) => index.slice_for_document(root, ordinal),
            None => {
                log::warn!("Document of frame {} not found in its session's DOM", frame);
                FrameDomMaps::default()
            }
        },
        None => FrameDomMaps::default(),
    };

    let a11y = a11y_for_frame(
        &cdp,
        &A11yOptions {
            frame_id: Some(frame),
            frame_ordinal: ordinal,
            dom: &dom,
            focus_backend_node: None,
        },
    )?;

    Ok(FrameSnapshot {
        frame_id: frame.to_string(),
        frame_ordinal: ordinal,
        session_id: session.id().to_string(),
        outline: a11y.outline,
        xpath_map: dom.xpaths.into_iter().collect(),
        url_map: a11y.url_map,
        absolute_prefix: String::new(),
    })
}

/// Backend id of the document node that holds `frame`'s content.
///
/// A frame whose parent lives in another session (or that has no parent) is
/// its session's top document. Otherwise the hosting iframe is looked up and
/// its content document taken from the index.
pub(crate) fn frame_document_root(
    page: &Page,
    frame: &str,
    index: &SessionDomIndex,
    cdp: &Cdp<'_>,
) -> Result<Option<BackendNodeId>> {
    let same_session_parent = page
        .registry()
        .parent_of(frame)
        .is_some_and(|parent| page.session_for_frame(parent).id() == cdp.session_id());
    if !same_session_parent {
        return Ok(Some(index.root_backend()));
    }

    match cdp.get_frame_owner(frame) {
        Ok(Some(owner)) => Ok(index.content_document_of(owner)),
        Ok(None) => Ok(None),
        Err(e) if e.is_timeout() => Err(e),
        Err(e) => {
            log::debug!("DOM.getFrameOwner({}) failed: {}", frame, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A host page with one same-session iframe containing a Submit button.

    use crate::page::Page;
    use crate::protocol::Deadline;
    use crate::protocol::testing::ScriptedSession;
    use serde_json::{Value, json};
    use std::sync::Arc;

    pub fn document() -> Value {
        json!({ "root": {
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML", "localName": "html",
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
        }})
    }

    fn role(value: &str) -> Value {
        json!({ "type": "role", "value": value })
    }

    fn name(value: &str) -> Value {
        json!({ "type": "computedString", "value": value })
    }

    pub fn host_ax() -> Value {
        json!({ "nodes": [
            { "nodeId": "a1", "role": role("RootWebArea"), "name": name("Host"), "backendDOMNodeId": 1, "childIds": ["a2"] },
            { "nodeId": "a2", "role": role("generic"), "backendDOMNodeId": 3, "parentId": "a1", "childIds": ["a3", "a4"] },
            { "nodeId": "a3", "role": role("heading"), "name": name("Title"), "backendDOMNodeId": 5, "parentId": "a2" },
            { "nodeId": "a4", "role": role("Iframe"), "backendDOMNodeId": 4, "parentId": "a2" }
        ]})
    }

    pub fn child_ax() -> Value {
        json!({ "nodes": [
            { "nodeId": "b1", "role": role("RootWebArea"), "backendDOMNodeId": 10, "childIds": ["b2"] },
            { "nodeId": "b2", "role": role("generic"), "backendDOMNodeId": 12, "parentId": "b1", "childIds": ["b3"] },
            { "nodeId": "b3", "role": role("button"), "name": name("Submit"), "backendDOMNodeId": 13, "parentId": "b2", "childIds": ["b4"] },
            { "nodeId": "b4", "role": role("StaticText"), "name": name("Submit"), "backendDOMNodeId": 14, "parentId": "b3" }
        ]})
    }

    pub const FULL_OUTLINE: &str = "[0-1] RootWebArea: Host\n  [0-3] generic\n    [0-5] heading: Title\n    [0-4] Iframe\n      [1-10] RootWebArea\n        [1-13] button: Submit";

    /// Session answering everything a full snapshot needs
    pub fn session() -> ScriptedSession {
        ScriptedSession::new("s1")
            .on_value(
                "Page.getFrameTree",
                json!({ "frameTree": {
                    "frame": { "id": "F0", "url": "https://host.test/" },
                    "childFrames": [{ "frame": { "id": "F1", "parentId": "F0", "url": "https://host.test/inner" } }]
                }}),
            )
            .on_value("DOM.getDocument", document())
            .on("DOM.getFrameOwner", |params| match params["frameId"].as_str() {
                Some("F1") => Ok(json!({ "backendNodeId": 4 })),
                _ => Ok(json!({})),
            })
            .on("Accessibility.getFullAXTree", |params| match params["frameId"].as_str() {
                Some("F1") => Ok(child_ax()),
                _ => Ok(host_ax()),
            })
            .on_value("Page.createIsolatedWorld", json!({ "executionContextId": 3 }))
            .on_value("Runtime.releaseObject", json!({}))
    }

    pub fn page(session: ScriptedSession) -> (Page, Arc<ScriptedSession>) {
        let session = Arc::new(session);
        let page = Page::attach(session.clone(), &Deadline::unbounded("test")).unwrap();
        (page, session)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{self, FULL_OUTLINE};
    use super::*;
    use crate::dom::EncodedId;
    use crate::error::BrowserError;
    use serde_json::json;

    #[test]
    fn test_nested_iframe_snapshot() {
        let (page, session) = fixtures::page(fixtures::session());
        let snapshot = capture_hybrid_snapshot(&page, &SnapshotOptions::default()).unwrap();

        assert_eq!(snapshot.combined_tree, FULL_OUTLINE);
        assert_eq!(
            snapshot.combined_xpath_map.get(&EncodedId::new(1, 13)),
            Some("/html[1]/body[1]/iframe[1]/html[1]/body[1]/button[1]")
        );
        assert_eq!(
            snapshot.combined_xpath_map.get(&EncodedId::new(0, 4)),
            Some("/html[1]/body[1]/iframe[1]")
        );
        // documents appear in the outline but have no path of their own
        assert_eq!(snapshot.combined_xpath_map.get(&EncodedId::new(0, 1)), None);
        assert_eq!(snapshot.combined_xpath_map.get(&EncodedId::new(1, 10)), None);

        let inner = snapshot.frame("F1").unwrap();
        assert_eq!(inner.frame_ordinal, 1);
        assert_eq!(inner.absolute_prefix, "/html[1]/body[1]/iframe[1]");
        assert_eq!(inner.xpath_map.get(&EncodedId::new(1, 13)), Some("/html[1]/body[1]/button[1]"));

        // one index for the one session
        assert_eq!(session.call_count("DOM.getDocument"), 1);
    }

    #[test]
    fn test_every_element_has_exactly_one_path() {
        let (page, _) = fixtures::page(fixtures::session());
        let snapshot = capture_hybrid_snapshot(&page, &SnapshotOptions::default()).unwrap();

        let per_frame_total: usize = snapshot.per_frame.iter().map(|f| f.xpath_map.len()).sum();
        assert_eq!(per_frame_total, snapshot.combined_xpath_map.len());
        assert_eq!(snapshot.combined_xpath_map.len(), 8);
    }

    #[test]
    fn test_no_two_ids_share_a_path() {
        let (page, _) = fixtures::page(fixtures::session());
        let snapshot = capture_hybrid_snapshot(&page, &SnapshotOptions::default()).unwrap();

        let mut owners: HashMap<&str, Vec<String>> = HashMap::new();
        for (id, xpath) in snapshot.combined_xpath_map.iter() {
            owners.entry(xpath).or_default().push(id.to_string());
        }
        for (xpath, ids) in &owners {
            assert_eq!(ids.len(), 1, "{} is shared by {:?}", xpath, ids);
        }
        assert!(!owners.contains_key("/"));
    }

    #[test]
    fn test_unmatched_focus_falls_back_to_full_snapshot() {
        let (page, _) = fixtures::page(
            fixtures::session()
                .on_value("Runtime.evaluate", json!({ "result": { "type": "object", "subtype": "null" } })),
        );
        let options = SnapshotOptions::new().focus("//div[@id='missing']");

        let snapshot = capture_hybrid_snapshot(&page, &options).unwrap();
        assert_eq!(snapshot.combined_tree, FULL_OUTLINE);
        assert_eq!(snapshot.per_frame.len(), 2);
    }

    #[test]
    fn test_failing_child_frame_is_skipped() {
        let (page, _) = fixtures::page(fixtures::session().on("Accessibility.getFullAXTree", |params| {
            match params["frameId"].as_str() {
                Some("F1") => Err(BrowserError::protocol("Accessibility.getFullAXTree", "frame detached")),
                _ => Ok(fixtures::host_ax()),
            }
        }));

        let snapshot = capture_hybrid_snapshot(&page, &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.per_frame.len(), 1);
        assert!(!snapshot.combined_tree.contains("Submit"));
    }

    #[test]
    fn test_expired_budget_is_a_timeout() {
        let (page, _) = fixtures::page(fixtures::session());
        let options = SnapshotOptions::new().timeout(Duration::ZERO);

        let err = capture_hybrid_snapshot(&page, &options).unwrap_err();
        assert!(err.is_timeout());
    }
}
