//! # browser-snapshot
//!
//! Cross-frame page snapshots and self-healing element actions over the Chrome
//! DevTools Protocol (CDP), built for AI agents that read a page as text and act
//! on it by id.
//!
//! ## Features
//!
//! - **Hybrid snapshots**: one accessibility outline for the whole page, with
//!   every iframe's content injected under its host element
//! - **Addressable elements**: every node gets a frame-qualified id
//!   (`"<frameOrdinal>-<backendNodeId>"`) and an absolute XPath that resolves
//!   from the top document, through iframes and shadow roots
//! - **Deterministic actions**: click, fill, type, press, scroll, select, drag
//!   on a selector, retried once against an inferred element when the selector
//!   no longer matches
//!
//! ## Snapshot a page
//!
//! ```rust,no_run
//! use browser_snapshot::{BrowserSession, LaunchOptions, SnapshotOptions};
//!
//! # fn main() -> browser_snapshot::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://example.com")?;
//!
//! let snapshot = session.capture_snapshot(&SnapshotOptions::default())?;
//! println!("{}", snapshot.combined_tree);
//!
//! for (id, xpath) in snapshot.combined_xpath_map.iter() {
//!     println!("{id} => {xpath}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Act on an element
//!
//! ```rust,no_run
//! use browser_snapshot::{ActOptions, Action, BrowserSession, LaunchOptions};
//!
//! # fn main() -> browser_snapshot::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! session.navigate("https://example.com/login")?;
//!
//! let action = Action::new("xpath=/html/body/form/input[1]", "fill")
//!     .with_description("email field")
//!     .with_arguments(["%email%"]);
//! let options = ActOptions::new().variable("email", "ada@example.com");
//!
//! let result = session.act(&action, &options, None)?;
//! assert!(result.success, "{}", result.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: launching or connecting to Chrome, and the tab-backed CDP session
//! - [`protocol`]: the CDP session seam, typed calls and operation deadlines
//! - [`frames`]: frame topology and session ownership
//! - [`page`]: a page's frames, sessions, frame ordinals and action history
//! - [`dom`]: DOM retrieval, encoded ids and XPath arithmetic
//! - [`a11y`]: accessibility trees and outline rendering
//! - [`snapshot`]: per-frame capture and page-wide merge
//! - [`locator`]: cross-frame selector resolution
//! - [`actions`]: the method table, self-heal and network settling
//! - [`error`]: error types and result aliases
#![recursion_limit = "256"]

pub mod a11y;
pub mod actions;
pub mod browser;
pub mod dom;
pub mod error;
pub mod frames;
pub mod locator;
pub mod page;
pub mod protocol;
pub mod snapshot;

pub use actions::{ActOptions, Action, ActionResult, ElementInference, InferredElement, SettleConfig,
                  take_deterministic_action};
pub use browser::{BrowserSession, ConnectionOptions, LaunchOptions};
pub use dom::{DomFetchConfig, EncodedId};
pub use error::{BrowserError, Result};
pub use page::Page;
pub use protocol::{Deadline, ProtocolSession};
pub use snapshot::{ElementMap, FrameSnapshot, HybridSnapshot, SnapshotOptions, capture_hybrid_snapshot};
