//! Focus-selector fast path: snapshot only the frame that owns the selected
//! element, with the outline scoped to that element's subtree.

use super::{ElementMap, FrameSnapshot, HybridSnapshot, SnapshotOptions, frame_document_root};
use crate::a11y::{A11yOptions, a11y_for_frame};
use crate::dom::build_session_dom_index;
use crate::dom::xpath::prefix_xpath;
use crate::error::Result;
use crate::locator::{backend_node_of, release_element, resolve_frame_hops, resolve_in_frame};
use crate::page::Page;
use crate::protocol::{Cdp, Deadline};

/// `Ok(None)` means the selector did not narrow anything and the caller should
/// capture the whole page.
pub(crate) fn try_scoped_snapshot(
    page: &Page,
    selector: &str,
    options: &SnapshotOptions,
    deadline: &Deadline,
) -> Result<Option<HybridSnapshot>> {
    let hop = resolve_frame_hops(page, page.main_frame_id(), selector, deadline)?;
    let frame = hop.frame_id.as_str();
    let is_main = frame == page.main_frame_id();
    if !is_main && hop.absolute_prefix.is_empty() {
        log::debug!("Focus frame {} was entered by CSS, no positional prefix available", frame);
        return Ok(None);
    }

    let target = resolve_in_frame(page, frame, &hop.selector, deadline)?;
    let backend = backend_node_of(page, &target, deadline);
    release_element(page, &target, deadline);
    let backend = backend?;

    let session = page.session_for_frame(frame);
    let cdp = Cdp::new(session, deadline);
    let index = build_session_dom_index(&cdp, &options.dom)?;
    let ordinal = page.frame_ordinal(frame);
    let Some(doc_root) = frame_document_root(page, frame, &index, &cdp)? else {
        return Ok(None);
    };
    let dom = index.slice_for_document(doc_root, ordinal);

    let a11y = a11y_for_frame(
        &cdp,
        &A11yOptions {
            frame_id: Some(frame),
            frame_ordinal: ordinal,
            dom: &dom,
            focus_backend_node: Some(backend),
        },
    )?;
    if !a11y.scope_applied {
        return Ok(None);
    }

    let xpath_map: ElementMap = dom.xpaths.into_iter().collect();
    let combined_xpath_map: ElementMap = if is_main {
        xpath_map.clone()
    } else {
        xpath_map
            .iter()
            .map(|(id, local)| (*id, prefix_xpath(&hop.absolute_prefix, local)))
            .collect()
    };

    log::debug!("Scoped snapshot of '{}' in frame {}", selector, frame);
    Ok(Some(HybridSnapshot {
        combined_tree: a11y.outline.clone(),
        combined_xpath_map,
        combined_url_map: a11y.url_map.clone(),
        per_frame: vec![FrameSnapshot {
            frame_id: frame.to_string(),
            frame_ordinal: ordinal,
            session_id: session.id().to_string(),
            outline: a11y.outline,
            xpath_map,
            url_map: a11y.url_map,
            absolute_prefix: hop.absolute_prefix.clone(),
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::super::{SnapshotOptions, capture_hybrid_snapshot};
    use crate::dom::EncodedId;
    use serde_json::json;

    #[test]
    fn test_focus_inside_iframe_scopes_to_one_frame() {
        let session = fixtures::session()
            .on("Runtime.evaluate", |params| {
                let expr = params["expression"].as_str().unwrap_or_default();
                let object = if expr.ends_with("(\"/html/body/iframe\")") { "iframe-obj" } else { "button-obj" };
                Ok(json!({ "result": { "type": "object", "subtype": "node", "objectId": object } }))
            })
            .on("DOM.describeNode", |params| {
                let backend = if params["objectId"] == "iframe-obj" { 4 } else { 13 };
                Ok(json!({ "node": { "backendNodeId": backend, "nodeType": 1, "nodeName": "X" } }))
            });
        let (page, session) = fixtures::page(session);
        let options = SnapshotOptions::new().focus("/html/body/iframe/html/body/button");

        let snapshot = capture_hybrid_snapshot(&page, &options).unwrap();
        assert_eq!(snapshot.combined_tree, "[1-13] button: Submit");
        assert_eq!(snapshot.per_frame.len(), 1);
        assert_eq!(
            snapshot.combined_xpath_map.get(&EncodedId::new(1, 13)),
            Some("/html/body/iframe/html[1]/body[1]/button[1]")
        );

        let frames_fetched: Vec<_> = session
            .calls()
            .into_iter()
            .filter(|(m, _)| m == "Accessibility.getFullAXTree")
            .map(|(_, p)| p["frameId"].clone())
            .collect();
        assert_eq!(frames_fetched, vec![json!("F1")]);
    }
}
