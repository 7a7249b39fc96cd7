use crate::actions::{ActOptions, Action, ActionResult, ElementInference, SettleConfig, perform_understudy_method,
                     settle_best_effort, take_deterministic_action, wait_for_settled_dom};
use crate::browser::cdp::{TabFrameEvents, TabNetworkEvents, TabSession};
use crate::browser::config::{ConnectionOptions, LaunchOptions};
use crate::error::{BrowserError, Result};
use crate::page::Page;
use crate::protocol::{Deadline, ProtocolSession, best_effort};
use crate::snapshot::{HybridSnapshot, SnapshotOptions, capture_hybrid_snapshot};
use headless_chrome::{Browser, Tab};
use std::{ffi::OsStr, sync::Arc, time::Duration};

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,

    /// Per-response timeout applied to every tab this session hands out
    tab_timeout: Duration,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // Cross-origin iframes stay in the tab's renderer so one session sees every frame
        if !options.site_isolation {
            launch_opts.args.push(OsStr::new("--disable-features=IsolateOrigins,site-per-process"));
        }

        // Set the browser's idle timeout to 1 hour (default is 30 seconds) to prevent the session from closing too soon
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir {
            launch_opts.user_data_dir = Some(dir);
        }

        let browser = Browser::new(launch_opts).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let tab = browser.new_tab().map_err(|e| BrowserError::LaunchFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(options.tab_timeout);

        log::info!("Launched browser (headless: {})", options.headless);
        Ok(Self {
            browser,
            tab_timeout: options.tab_timeout,
        })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser =
            Browser::connect(options.ws_url.clone()).map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;

        log::info!("Connected to browser at {}", options.ws_url);
        Ok(Self {
            browser,
            tab_timeout: Duration::from_millis(options.timeout),
        })
    }

    /// Get the active tab
    pub fn tab(&self) -> Result<Arc<Tab>> {
        let tab = self.get_active_tab()?;
        tab.set_default_timeout(self.tab_timeout);
        Ok(tab)
    }

    /// Create a new tab
    pub fn new_tab(&mut self) -> Result<Arc<Tab>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(self.tab_timeout);
        Ok(tab)
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Get the currently active tab by checking the document visibility and focus state
    pub fn get_active_tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        // Strongest signal first, then visibility alone
        for check in ["document.visibilityState === 'visible' && document.hasFocus()", "document.visibilityState === 'visible'"] {
            for tab in &tabs {
                match tab.evaluate(check, false) {
                    Ok(remote_object) => {
                        if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                            return Ok(tab.clone());
                        }
                    }
                    Err(e) => log::debug!("Failed to check tab status: {}", e),
                }
            }
        }

        // A lone tab is active whatever it reports
        match tabs.as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(BrowserError::TabOperationFailed("No active tab found".to_string())),
        }
    }

    /// Close the active tab
    pub fn close_active_tab(&mut self) -> Result<()> {
        self.tab()?.close(true).map_err(|e| BrowserError::TabOperationFailed(format!("Failed to close tab: {}", e)))?;

        Ok(())
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Navigate to a URL using the active tab and wait for the load to finish
    pub fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// Page model of the active tab with a fresh frame registry.
    ///
    /// The page listens for frame events from here on; call
    /// [`Page::sync_frames`] to fold them into its registry.
    pub fn page(&self) -> Result<Page> {
        let tab = self.tab()?;
        // listen before reading the tree so nothing falls between the two
        let events = best_effort("frame events", || TabFrameEvents::attach(tab.clone()));
        let session: Arc<dyn ProtocolSession> = Arc::new(TabSession::new(tab));
        let mut page = Page::attach(session, &Deadline::new("attach", Some(self.tab_timeout)))?;
        if let Some(events) = events {
            page = page.with_frame_events(Box::new(events));
            page.sync_frames();
        }
        Ok(page)
    }

    /// Snapshot the active tab
    pub fn capture_snapshot(&self, options: &SnapshotOptions) -> Result<HybridSnapshot> {
        capture_hybrid_snapshot(&self.page()?, options)
    }

    /// Run one method on the element `selector` resolves to, without self-heal
    pub fn perform(&self, method: &str, selector: &str, args: &[String], timeout: Option<Duration>) -> Result<()> {
        let page = self.page()?;
        perform_understudy_method(&page, None, method, selector, args, &Deadline::new(method, timeout))
    }

    /// Run an action on the active tab, settling the network first when configured.
    ///
    /// Settling never fails the action; an unobservable network is acted on as is.
    pub fn act(
        &self,
        action: &Action,
        options: &ActOptions,
        inference: Option<&dyn ElementInference>,
    ) -> Result<ActionResult> {
        if let Some(settle) = &options.settle {
            settle_best_effort(|| TabNetworkEvents::attach(self.tab()?), settle, None);
        }
        let page = self.page()?;
        take_deterministic_action(&page, action, options, inference)
    }

    /// Wait until the active tab's network is quiet. `Ok(false)` means it never was.
    pub fn wait_for_dom_settle(&self, config: &SettleConfig) -> Result<bool> {
        let events = TabNetworkEvents::attach(self.tab()?)?;
        Ok(wait_for_settled_dom(&events, config, None))
    }

    /// Close the browser
    pub fn close(&self) -> Result<()> {
        // headless_chrome closes the process when Browser drops; closing tabs ends the session early
        let tabs = self.get_tabs()?;
        for tab in tabs {
            if let Err(e) = tab.close(false) {
                log::debug!("Failed to close tab: {}", e);
            }
        }
        Ok(())
    }
}
