use super::{LocalSelector, normalize_selector, split_hops};
use crate::dom::xpath::{XPathStep, parse_xpath_steps, prefix_xpath, steps_to_xpath};
use crate::error::{BrowserError, Result};
use crate::page::Page;
use crate::protocol::{BackendNodeId, Cdp, Deadline, NodeTarget, best_effort};

const RESOLVE_XPATH_JS: &str = include_str!("resolve_xpath.js");

/// Remote reference to a resolved element, valid in its frame's isolated world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub frame_id: String,
    pub object_id: String,
}

/// Where a selector ends up after every iframe hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHop {
    pub frame_id: String,
    /// What is left to evaluate inside `frame_id`
    pub selector: LocalSelector,
    /// Absolute XPath of the innermost iframe element; empty for the start frame
    pub absolute_prefix: String,
}

/// Resolve a (possibly cross-frame) selector from the main frame
pub fn resolve_locator(page: &Page, selector: &str, deadline: &Deadline) -> Result<ElementHandle> {
    resolve_locator_from(page, page.main_frame_id(), selector, deadline)
}

pub fn resolve_locator_from(page: &Page, frame_id: &str, selector: &str, deadline: &Deadline) -> Result<ElementHandle> {
    let hop = resolve_frame_hops(page, frame_id, selector, deadline)?;
    resolve_in_frame(page, &hop.frame_id, &hop.selector, deadline)
}

/// Walk every iframe hop in `selector`, starting at `start_frame`
pub fn resolve_frame_hops(page: &Page, start_frame: &str, selector: &str, deadline: &Deadline) -> Result<FrameHop> {
    let normalized = normalize_selector(selector);
    let segments = split_hops(&normalized);
    let Some((last, hosts)) = segments.split_last() else {
        return Err(BrowserError::InvalidSelector(selector.to_string()));
    };

    let mut hop = FrameHop {
        frame_id: start_frame.to_string(),
        selector: LocalSelector::Css(String::new()),
        absolute_prefix: String::new(),
    };

    for segment in hosts {
        let selector = LocalSelector::parse(segment)?;
        let inner = walk_xpath_hops(page, hop.frame_id, hop.absolute_prefix, selector, deadline)?;
        let handle = resolve_in_frame(page, &inner.frame_id, &inner.selector, deadline)
            .map_err(|e| iframe_error(e, segment, &inner.frame_id))?;
        let child = enter_iframe(page, &inner.frame_id, &handle, deadline);
        release_element(page, &handle, deadline);

        hop = FrameHop {
            frame_id: child?,
            absolute_prefix: match &inner.selector {
                LocalSelector::XPath(path) => prefix_xpath(&inner.absolute_prefix, path),
                // a CSS host has no positional path; keep the outer prefix
                LocalSelector::Css(_) => inner.absolute_prefix,
            },
            selector: inner.selector,
        };
    }

    walk_xpath_hops(page, hop.frame_id, hop.absolute_prefix, LocalSelector::parse(last)?, deadline)
}

/// Enter every `iframe` step of an XPath that is followed by more steps
fn walk_xpath_hops(
    page: &Page,
    mut frame_id: String,
    mut prefix: String,
    selector: LocalSelector,
    deadline: &Deadline,
) -> Result<FrameHop> {
    let LocalSelector::XPath(path) = &selector else {
        return Ok(FrameHop {
            frame_id,
            selector,
            absolute_prefix: prefix,
        });
    };

    let steps = parse_xpath_steps(path);
    let last = steps.len().saturating_sub(1);
    let mut buffer: Vec<XPathStep> = Vec::new();

    for (i, step) in steps.into_iter().enumerate() {
        let hop_here = step.is_iframe() && i < last;
        buffer.push(step);
        if !hop_here {
            continue;
        }

        let local = steps_to_xpath(&buffer);
        let handle = resolve_in_frame(page, &frame_id, &LocalSelector::XPath(local.clone()), deadline)
            .map_err(|e| iframe_error(e, &local, &frame_id))?;
        let child = enter_iframe(page, &frame_id, &handle, deadline);
        release_element(page, &handle, deadline);

        prefix = prefix_xpath(&prefix, &local);
        frame_id = child?;
        buffer.clear();
        log::debug!("Selector hop into frame {} at {}", frame_id, prefix);
    }

    Ok(FrameHop {
        frame_id,
        selector: LocalSelector::XPath(steps_to_xpath(&buffer)),
        absolute_prefix: prefix,
    })
}

fn iframe_error(e: BrowserError, selector: &str, frame_id: &str) -> BrowserError {
    match e {
        BrowserError::ElementNotFound(_) => {
            BrowserError::IframeResolution(format!("iframe '{}' not found in frame {}", selector, frame_id))
        }
        other => other,
    }
}

fn enter_iframe(page: &Page, frame_id: &str, handle: &ElementHandle, deadline: &Deadline) -> Result<String> {
    let backend = backend_node_of(page, handle, deadline)?;
    child_frame_hosted_by(page, frame_id, backend, deadline)
}

/// Child frame of `frame_id` whose owner element is `backend_node_id`
pub fn child_frame_hosted_by(
    page: &Page,
    frame_id: &str,
    backend_node_id: BackendNodeId,
    deadline: &Deadline,
) -> Result<String> {
    let cdp = Cdp::new(page.session_for_frame(frame_id), deadline);
    for child in page.registry().children_of(frame_id) {
        match cdp.get_frame_owner(child) {
            Ok(Some(owner)) if owner == backend_node_id => return Ok(child.clone()),
            Ok(_) => {}
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => log::debug!("DOM.getFrameOwner({}) failed: {}", child, e),
        }
    }
    Err(BrowserError::IframeResolution(format!(
        "no child frame of {} is hosted by element {}",
        frame_id, backend_node_id
    )))
}

/// Evaluate a single-document selector inside `frame_id`
pub fn resolve_in_frame(
    page: &Page,
    frame_id: &str,
    selector: &LocalSelector,
    deadline: &Deadline,
) -> Result<ElementHandle> {
    let argument = serde_json::to_string(selector.as_str())?;
    let expression = match selector {
        LocalSelector::XPath(_) => format!("({})({})", RESOLVE_XPATH_JS.trim(), argument),
        LocalSelector::Css(_) => format!("document.querySelector({})", argument),
    };

    let object = page.evaluate_in_frame(frame_id, &expression, false, deadline)?;
    match object.object_id {
        Some(object_id) if object.subtype.as_deref() != Some("null") => Ok(ElementHandle {
            frame_id: frame_id.to_string(),
            object_id,
        }),
        _ => Err(BrowserError::ElementNotFound(format!(
            "'{}' in frame {}",
            selector.as_str(),
            frame_id
        ))),
    }
}

pub fn backend_node_of(page: &Page, handle: &ElementHandle, deadline: &Deadline) -> Result<BackendNodeId> {
    let cdp = Cdp::new(page.session_for_frame(&handle.frame_id), deadline);
    let node = cdp.describe_node(&NodeTarget::Object(handle.object_id.clone()), 0, false)?;
    Ok(node.backend_node_id)
}

pub fn release_element(page: &Page, handle: &ElementHandle, deadline: &Deadline) {
    let cdp = Cdp::new(page.session_for_frame(&handle.frame_id), deadline);
    best_effort("Runtime.releaseObject", || cdp.release_object(&handle.object_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::ScriptedSession;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn node_object(id: &str) -> Value {
        json!({ "result": { "type": "object", "subtype": "node", "objectId": id } })
    }

    fn null_object() -> Value {
        json!({ "result": { "type": "object", "subtype": "null" } })
    }

    fn page_with(session: ScriptedSession) -> Page {
        let session = session
            .on_value(
                "Page.getFrameTree",
                json!({ "frameTree": {
                    "frame": { "id": "F0" },
                    "childFrames": [{ "frame": { "id": "F1", "parentId": "F0" } }]
                }}),
            )
            .on_value("Page.createIsolatedWorld", json!({ "executionContextId": 7 }))
            .on_value("Runtime.releaseObject", json!({}))
            .on("DOM.describeNode", |params| {
                let backend = match params["objectId"].as_str() {
                    Some("iframe-obj") => 4,
                    _ => 99,
                };
                Ok(json!({ "node": { "backendNodeId": backend, "nodeType": 1, "nodeName": "X" } }))
            })
            .on("DOM.getFrameOwner", |params| match params["frameId"].as_str() {
                Some("F1") => Ok(json!({ "backendNodeId": 4 })),
                _ => Ok(json!({})),
            });
        Page::attach(Arc::new(session), &Deadline::unbounded("test")).unwrap()
    }

    fn evaluates(expected_tail: &'static str, id: &'static str) -> impl Fn(&Value) -> Result<Value> + Send + Sync {
        move |params| {
            let expr = params["expression"].as_str().unwrap_or_default();
            if expr.ends_with(expected_tail) {
                Ok(node_object(id))
            } else {
                Ok(node_object("leaf-obj"))
            }
        }
    }

    #[test]
    fn test_xpath_hops_through_iframe() {
        let page = page_with(
            ScriptedSession::new("s1").on("Runtime.evaluate", evaluates("(\"/html/body/iframe\")", "iframe-obj")),
        );
        let deadline = Deadline::unbounded("test");

        let hop = resolve_frame_hops(&page, "F0", "xpath=/html/body/iframe/html/body/button", &deadline).unwrap();
        assert_eq!(hop.frame_id, "F1");
        assert_eq!(hop.selector, LocalSelector::XPath("/html/body/button".into()));
        assert_eq!(hop.absolute_prefix, "/html/body/iframe");
    }

    #[test]
    fn test_trailing_iframe_step_targets_the_element() {
        let page = page_with(ScriptedSession::new("s1"));
        let hop = resolve_frame_hops(&page, "F0", "/html/body/iframe[1]", &Deadline::unbounded("test")).unwrap();
        assert_eq!(hop.frame_id, "F0");
        assert_eq!(hop.selector, LocalSelector::XPath("/html/body/iframe[1]".into()));
    }

    #[test]
    fn test_chained_css_hop() {
        let page = page_with(
            ScriptedSession::new("s1").on("Runtime.evaluate", evaluates("(\"iframe#pay\")", "iframe-obj")),
        );
        let deadline = Deadline::unbounded("test");

        let hop = resolve_frame_hops(&page, "F0", "iframe#pay >> //button", &deadline).unwrap();
        assert_eq!(hop.frame_id, "F1");
        assert_eq!(hop.selector, LocalSelector::XPath("//button".into()));
        assert_eq!(hop.absolute_prefix, "");
    }

    #[test]
    fn test_separator_inside_predicate_is_not_a_hop() {
        let page = page_with(ScriptedSession::new("s1"));
        let hop = resolve_frame_hops(&page, "F0", "//a[text()='>>']", &Deadline::unbounded("test")).unwrap();
        assert_eq!(hop.frame_id, "F0");
        assert_eq!(hop.selector, LocalSelector::XPath("//a[text()='>>']".into()));
    }

    #[test]
    fn test_unknown_iframe_is_a_resolution_error() {
        let page = page_with(ScriptedSession::new("s1").on("Runtime.evaluate", |_| Ok(node_object("other-obj"))));
        let err = resolve_frame_hops(&page, "F0", "/html/body/iframe/html", &Deadline::unbounded("test")).unwrap_err();
        assert!(matches!(err, BrowserError::IframeResolution(_)));
    }

    #[test]
    fn test_missing_element_is_not_found() {
        let page = page_with(ScriptedSession::new("s1").on_value("Runtime.evaluate", null_object()));
        let deadline = Deadline::unbounded("test");

        let err = resolve_locator(&page, "//div[@id='missing']", &deadline).unwrap_err();
        assert!(matches!(err, BrowserError::ElementNotFound(_)));

        let err = resolve_frame_hops(&page, "F0", "/html/body/iframe/html", &deadline).unwrap_err();
        assert!(matches!(err, BrowserError::IframeResolution(_)));
    }

    #[test]
    fn test_resolved_handle_reports_backend_id() {
        let page = page_with(ScriptedSession::new("s1").on_value("Runtime.evaluate", node_object("iframe-obj")));
        let deadline = Deadline::unbounded("test");

        let handle = resolve_locator(&page, "/html/body/iframe", &deadline).unwrap();
        assert_eq!(handle.frame_id, "F0");
        assert_eq!(backend_node_of(&page, &handle, &deadline).unwrap(), 4);
    }
}
