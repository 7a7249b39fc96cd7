//! Browser lifecycle over headless_chrome, and the glue that runs snapshots
//! and actions against a live tab.

pub mod cdp;
pub mod config;
pub mod session;

pub use cdp::{TabEvents, TabFrameEvents, TabNetworkEvents, TabSession};
pub use config::{ConnectionOptions, LaunchOptions};
pub use session::BrowserSession;
