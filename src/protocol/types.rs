//! Typed CDP payloads used by the snapshot and action layers.
//!
//! Only the fields this crate reads are modelled; everything is lenient so that
//! payload differences between Chrome versions do not break deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol-stable numeric handle for a DOM node within one document lifetime
pub type BackendNodeId = i64;

pub const ELEMENT_NODE: i64 = 1;
pub const TEXT_NODE: i64 = 3;
pub const COMMENT_NODE: i64 = 8;
pub const DOCUMENT_NODE: i64 = 9;
pub const DOCUMENT_FRAGMENT_NODE: i64 = 11;

/// `DOM.Node`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    #[serde(default)]
    pub node_id: i64,

    #[serde(default)]
    pub backend_node_id: BackendNodeId,

    #[serde(default)]
    pub node_type: i64,

    #[serde(default)]
    pub node_name: String,

    #[serde(default)]
    pub local_name: String,

    #[serde(default)]
    pub node_value: String,

    /// Number of children the browser knows about, realized or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_node_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DomNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_document: Option<Box<DomNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_roots: Option<Vec<DomNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_scrollable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

impl DomNode {
    /// True when the protocol truncated this node's children
    pub fn should_expand(&self) -> bool {
        let realized = self.children.as_ref().map_or(0, Vec::len) as i64;
        self.child_node_count.unwrap_or(0) > realized
    }

    /// Lowercase tag (or `#document`, `#text`, ...) for this node
    pub fn tag(&self) -> String {
        if self.node_type == ELEMENT_NODE && !self.local_name.is_empty() {
            self.local_name.to_ascii_lowercase()
        } else {
            self.node_name.to_ascii_lowercase()
        }
    }

    /// Attribute value from the flat `[name, value, name, value, ...]` list
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.as_ref().and_then(|attrs| {
            attrs
                .chunks(2)
                .find(|pair| pair.len() == 2 && pair[0].eq_ignore_ascii_case(name))
                .map(|pair| pair[1].as_str())
        })
    }
}

/// `Accessibility.AXValue`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AxValue {
    #[serde(rename = "type", default)]
    pub value_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl AxValue {
    pub fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// `Accessibility.AXProperty`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AxProperty {
    pub name: String,
    #[serde(default)]
    pub value: AxValue,
}

/// `Accessibility.AXNode`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,

    #[serde(default)]
    pub ignored: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AxValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AxValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<AxValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AxValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<AxProperty>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_ids: Option<Vec<String>>,

    #[serde(rename = "backendDOMNodeId", default, skip_serializing_if = "Option::is_none")]
    pub backend_dom_node_id: Option<BackendNodeId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
}

impl AxNode {
    pub fn property(&self, name: &str) -> Option<&AxValue> {
        self.properties
            .as_ref()?
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// `Runtime.RemoteObject`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub object_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RemoteObject {
    /// Whether this object refers to an actual node (not `null`/`undefined`)
    pub fn is_node(&self) -> bool {
        self.object_id.is_some() && self.subtype.as_deref() != Some("null")
    }
}

/// `Page.Frame`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFrame {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub loader_id: String,

    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub security_origin: String,

    #[serde(default)]
    pub mime_type: String,
}

impl ProtocolFrame {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// `Page.FrameTree`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    pub frame: ProtocolFrame,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_frames: Vec<FrameTree>,
}

/// `DOM.BoxModel`, content quad only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BoxModel {
    #[serde(default)]
    pub content: Vec<f64>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl BoxModel {
    /// Centre of the content quad `[x1, y1, x2, y2, x3, y3, x4, y4]`
    pub fn center(&self) -> Option<(f64, f64)> {
        if self.content.len() < 8 {
            return None;
        }
        let x = (self.content[0] + self.content[2] + self.content[4] + self.content[6]) / 4.0;
        let y = (self.content[1] + self.content[3] + self.content[5] + self.content[7]) / 4.0;
        Some((x, y))
    }
}
