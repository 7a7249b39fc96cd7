//! Chrome DevTools Protocol seam
//!
//! Every round-trip the crate makes goes through a [`ProtocolSession`]. The
//! [`Cdp`] wrapper pairs a session with the operation's [`Deadline`] and exposes
//! the typed calls the snapshot and action layers need.

pub mod deadline;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use deadline::Deadline;
pub use types::{AxNode, AxProperty, AxValue, BackendNodeId, BoxModel, DomNode, FrameTree, ProtocolFrame, RemoteObject};

use crate::error::{BrowserError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};

/// One CDP session (a page target, or an out-of-process iframe target)
pub trait ProtocolSession: Send + Sync {
    /// Session identifier used by the frame registry for ownership
    fn id(&self) -> &str;

    /// Send a raw CDP command and return its result object
    fn send(&self, method: &str, params: Value) -> Result<Value>;
}

/// Run a side call whose failure must never fail the primary operation.
///
/// Errors are logged at debug level and discarded.
pub fn best_effort<T>(label: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("{} failed (ignored): {}", label, e);
            None
        }
    }
}

/// Which node a `DOM.describeNode` call targets
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTarget {
    Backend(BackendNodeId),
    Object(String),
}

impl NodeTarget {
    fn to_params(&self) -> Value {
        match self {
            NodeTarget::Backend(id) => json!({ "backendNodeId": id }),
            NodeTarget::Object(id) => json!({ "objectId": id }),
        }
    }
}

#[derive(Deserialize)]
struct GetDocumentResult {
    root: DomNode,
}

#[derive(Deserialize)]
struct DescribeNodeResult {
    node: DomNode,
}

#[derive(Deserialize)]
struct ResolveNodeResult {
    object: RemoteObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationResult {
    #[serde(default)]
    result: RemoteObject,
    #[serde(default)]
    exception_details: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsolatedWorldResult {
    execution_context_id: i64,
}

#[derive(Deserialize)]
struct FullAxTreeResult {
    #[serde(default)]
    nodes: Vec<AxNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameOwnerResult {
    #[serde(default)]
    backend_node_id: Option<BackendNodeId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTreeResult {
    frame_tree: FrameTree,
}

#[derive(Deserialize)]
struct BoxModelResult {
    model: BoxModel,
}

const ISOLATED_WORLD_NAME: &str = "__browser_snapshot_world__";

/// Typed, deadline-guarded view over a [`ProtocolSession`]
#[derive(Clone, Copy)]
pub struct Cdp<'a> {
    session: &'a dyn ProtocolSession,
    deadline: &'a Deadline,
}

impl<'a> Cdp<'a> {
    pub fn new(session: &'a dyn ProtocolSession, deadline: &'a Deadline) -> Self {
        Self { session, deadline }
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn deadline(&self) -> &'a Deadline {
        self.deadline
    }

    /// Raw call, after the budget check
    pub fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.deadline.check()?;
        self.session.send(method, params)
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.send(method, params)?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::protocol(method, format!("unexpected response: {}", e)))
    }

    pub fn enable(&self, domain: &str) -> Result<()> {
        self.send(&format!("{}.enable", domain), json!({}))?;
        Ok(())
    }

    /// `DOM.getDocument`; `depth == -1` means unlimited
    pub fn get_document(&self, depth: i64, pierce: bool) -> Result<DomNode> {
        let res: GetDocumentResult = self.call("DOM.getDocument", json!({ "depth": depth, "pierce": pierce }))?;
        Ok(res.root)
    }

    pub fn describe_node(&self, target: &NodeTarget, depth: i64, pierce: bool) -> Result<DomNode> {
        let mut params = target.to_params();
        params["depth"] = json!(depth);
        params["pierce"] = json!(pierce);
        let res: DescribeNodeResult = self.call("DOM.describeNode", params)?;
        Ok(res.node)
    }

    pub fn resolve_node(&self, backend_node_id: BackendNodeId) -> Result<RemoteObject> {
        let res: ResolveNodeResult = self.call("DOM.resolveNode", json!({ "backendNodeId": backend_node_id }))?;
        Ok(res.object)
    }

    pub fn release_object(&self, object_id: &str) -> Result<()> {
        self.send("Runtime.releaseObject", json!({ "objectId": object_id }))?;
        Ok(())
    }

    /// Run `declaration` with `this` bound to the remote object
    pub fn call_function_on(
        &self,
        object_id: &str,
        declaration: &str,
        arguments: &[Value],
        return_by_value: bool,
    ) -> Result<RemoteObject> {
        let args: Vec<Value> = arguments.iter().map(|v| json!({ "value": v })).collect();
        let res: EvaluationResult = self.call(
            "Runtime.callFunctionOn",
            json!({
                "objectId": object_id,
                "functionDeclaration": declaration,
                "arguments": args,
                "returnByValue": return_by_value,
                "awaitPromise": true,
            }),
        )?;
        Self::check_exception(res)
    }

    pub fn evaluate(&self, expression: &str, context_id: Option<i64>, return_by_value: bool) -> Result<RemoteObject> {
        let mut params = json!({
            "expression": expression,
            "returnByValue": return_by_value,
            "awaitPromise": true,
        });
        if let Some(ctx) = context_id {
            params["contextId"] = json!(ctx);
        }
        let res: EvaluationResult = self.call("Runtime.evaluate", params)?;
        Self::check_exception(res)
    }

    fn check_exception(res: EvaluationResult) -> Result<RemoteObject> {
        match res.exception_details {
            Some(details) => {
                let text = details
                    .pointer("/exception/description")
                    .or_else(|| details.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown exception")
                    .to_string();
                Err(BrowserError::EvaluationFailed(text))
            }
            None => Ok(res.result),
        }
    }

    /// Execution context id of an isolated world bound to `frame_id`
    pub fn create_isolated_world(&self, frame_id: &str) -> Result<i64> {
        let res: IsolatedWorldResult = self.call(
            "Page.createIsolatedWorld",
            json!({ "frameId": frame_id, "worldName": ISOLATED_WORLD_NAME, "grantUniveralAccess": true }),
        )?;
        Ok(res.execution_context_id)
    }

    pub fn get_full_ax_tree(&self, frame_id: Option<&str>) -> Result<Vec<AxNode>> {
        let params = match frame_id {
            Some(id) => json!({ "frameId": id }),
            None => json!({}),
        };
        let res: FullAxTreeResult = self.call("Accessibility.getFullAXTree", params)?;
        Ok(res.nodes)
    }

    /// Backend id of the `<iframe>` element hosting `frame_id`, if the session can see it
    pub fn get_frame_owner(&self, frame_id: &str) -> Result<Option<BackendNodeId>> {
        let res: FrameOwnerResult = self.call("DOM.getFrameOwner", json!({ "frameId": frame_id }))?;
        Ok(res.backend_node_id)
    }

    pub fn get_frame_tree(&self) -> Result<FrameTree> {
        let res: FrameTreeResult = self.call("Page.getFrameTree", json!({}))?;
        Ok(res.frame_tree)
    }

    pub fn get_box_model(&self, object_id: &str) -> Result<BoxModel> {
        let res: BoxModelResult = self.call("DOM.getBoxModel", json!({ "objectId": object_id }))?;
        Ok(res.model)
    }

    pub fn dispatch_mouse_event(&self, kind: &str, x: f64, y: f64, click_count: u32) -> Result<()> {
        let mut params = json!({ "type": kind, "x": x, "y": y });
        if kind != "mouseMoved" {
            params["button"] = json!("left");
            params["clickCount"] = json!(click_count);
        }
        self.send("Input.dispatchMouseEvent", params)?;
        Ok(())
    }

    /// `text` is what the key inserts on `keyDown`, e.g. `"\r"` for Enter
    pub fn dispatch_key_event(&self, kind: &str, key: &str, text: Option<&str>) -> Result<()> {
        let mut params = json!({ "type": kind, "key": key });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        self.send("Input.dispatchKeyEvent", params)?;
        Ok(())
    }

    pub fn insert_text(&self, text: &str) -> Result<()> {
        self.send("Input.insertText", json!({ "text": text }))?;
        Ok(())
    }
}
