//! Deterministic actions
//!
//! An [`Action`] names an element by selector and a method to run on it.
//! [`take_deterministic_action`] resolves the selector across frames, runs the
//! method, and, when the element cannot be used, asks an [`ElementInference`]
//! for a replacement from a fresh snapshot and retries exactly once.

pub mod execute;
pub mod methods;
pub mod settle;

pub use execute::{perform_understudy_method, substitute_variables, take_deterministic_action};
pub use methods::{MethodContext, MethodHandler, lookup_method, supported_methods};
pub use settle::{NetworkEvent, NetworkEventSource, NetworkIdleTracker, SettleConfig, settle_best_effort,
                 wait_for_settled_dom};

use crate::dom::EncodedId;
use crate::error::Result;
use crate::snapshot::HybridSnapshot;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One deterministic step against a page element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// XPath (optionally `xpath=` prefixed) or CSS selector. `>>` separates iframe hops.
    pub selector: String,

    /// What the element is, in words. Used to find it again if the selector fails.
    #[serde(default)]
    pub description: String,

    /// Method to run, e.g. "click", "fill", "press"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Method arguments; `%name%` is replaced from the act variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl Action {
    pub fn new(selector: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            description: String::new(),
            method: Some(method.into()),
            arguments: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of [`take_deterministic_action`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub action_description: String,
    /// The action that finally ran (the healed one after a self-heal)
    pub actions: Vec<Action>,
}

impl ActionResult {
    pub fn success(action: Action, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            action_description: action.description.clone(),
            actions: vec![action],
        }
    }

    pub fn failure(action: Action, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            action_description: action.description.clone(),
            actions: vec![action],
        }
    }
}

/// Entry in a page's action history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub action: Action,
    pub succeeded: bool,
}

/// Element chosen by an inference service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredElement {
    pub element_id: EncodedId,
    #[serde(default)]
    pub description: String,
}

/// Picks the element an instruction refers to from a snapshot
pub trait ElementInference {
    fn choose(&self, instruction: &str, snapshot: &HybridSnapshot) -> Result<Option<InferredElement>>;
}

/// Act configuration
#[derive(Debug, Clone)]
pub struct ActOptions {
    /// Retry once against an inferred element when the selector fails
    pub self_heal: bool,

    /// Budget for the whole act, self-heal included
    pub timeout: Option<Duration>,

    /// `%name%` substitutions for arguments
    pub variables: HashMap<String, String>,

    /// Wait for network quiet before acting
    pub settle: Option<SettleConfig>,
}

impl Default for ActOptions {
    fn default() -> Self {
        Self {
            self_heal: true,
            timeout: Some(Duration::from_secs(30)),
            variables: HashMap::new(),
            settle: None,
        }
    }
}

impl ActOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn self_heal(mut self, enabled: bool) -> Self {
        self.self_heal = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn settle(mut self, settle: SettleConfig) -> Self {
        self.settle = Some(settle);
        self
    }
}
