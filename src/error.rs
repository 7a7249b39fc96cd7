use thiserror::Error;

/// Errors produced while snapshotting a page or acting on it
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// A CDP round-trip was rejected by the browser
    #[error("Protocol call {method} failed: {message}")]
    Protocol { method: String, message: String },

    /// A truncated DOM node could not be expanded at any fallback depth
    #[error("Could not expand DOM node {backend_node_id}: {reason}")]
    NodeExpansionFailed { backend_node_id: i64, reason: String },

    #[error("Failed to parse DOM: {0}")]
    DomParseFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// An iframe hop inside a selector did not lead to a known child frame
    #[error("Iframe resolution failed: {0}")]
    IframeResolution(String),

    #[error("Unsupported action method: {0}")]
    UnsupportedMethod(String),

    #[error("Action '{method}' failed: {reason}")]
    ActionFailed { method: String, reason: String },

    /// The operation budget expired before the next protocol round-trip
    #[error("{operation} timed out after {budget_ms}ms")]
    Timeout { operation: String, budget_ms: u64 },

    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Element inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Markers Chrome uses when a DOM payload is too deep to serialize
const DEPTH_OVERFLOW_MARKERS: &[&str] = &["CBOR: stack limit exceeded", "Maximum call stack size exceeded"];

/// Markers for an execution context that no longer exists (navigation, frame teardown)
const CONTEXT_LOST_MARKERS: &[&str] = &[
    "Cannot find context with specified id",
    "Execution context was destroyed",
    "Cannot find default execution context",
];

impl BrowserError {
    pub fn protocol(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Whether this is a stack-overflow class failure from deeply nested markup
    pub fn is_depth_overflow(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => DEPTH_OVERFLOW_MARKERS.iter().any(|m| message.contains(m)),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Frame-scoped accessibility fetch rejected because the frame lives in another target
    pub fn is_out_of_target(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("does not belong to the target") || lower.contains("frame with the given id was not found")
            }
            _ => false,
        }
    }

    /// Evaluation targeted an execution context that is gone
    pub fn is_context_lost(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => CONTEXT_LOST_MARKERS.iter().any(|m| message.contains(m)),
            _ => false,
        }
    }

    /// Whether a failed action may be retried against a freshly inferred element
    pub fn allows_self_heal(&self) -> bool {
        !matches!(self, Self::Timeout { .. } | Self::UnsupportedMethod(_))
    }
}

/// Result type alias for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;
