//! Frame lifecycle events (`Page.frameAttached`, `Page.frameNavigated`,
//! `Page.frameDetached`) as the registry consumes them.

use super::registry::DetachReason;
use crate::protocol::ProtocolFrame;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Attached { frame_id: String, parent_id: Option<String> },
    Navigated(ProtocolFrame),
    Detached { frame_id: String, reason: DetachReason },
}

impl FrameEvent {
    pub fn frame_id(&self) -> &str {
        match self {
            FrameEvent::Attached { frame_id, .. } | FrameEvent::Detached { frame_id, .. } => frame_id,
            FrameEvent::Navigated(frame) => &frame.id,
        }
    }
}

/// Supplier of frame events observed since the previous drain
pub trait FrameEventSource: Send + Sync {
    fn drain(&self) -> Vec<FrameEvent>;
}
