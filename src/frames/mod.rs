//! Frame topology tracking

pub mod events;
pub mod registry;

pub use events::{FrameEvent, FrameEventSource};
pub use registry::{DetachReason, FrameRegistry};
