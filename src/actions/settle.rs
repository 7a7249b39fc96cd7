//! Network quiet detection used before acting.
//!
//! Settling is advisory: a page that never goes quiet only costs the timeout.

use crate::error::Result;
use crate::protocol::Deadline;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Network lifecycle events relevant to settling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    RequestStarted {
        request_id: String,
        resource_type: String,
        frame_id: Option<String>,
        url: String,
    },
    RequestFinished {
        request_id: String,
    },
    RequestFailed {
        request_id: String,
    },
    FrameStoppedLoading {
        frame_id: String,
    },
}

/// Supplier of network events observed since the previous drain
pub trait NetworkEventSource {
    fn drain(&self) -> Vec<NetworkEvent>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettleConfig {
    /// How long the network must stay idle
    pub quiet_window: Duration,

    /// Requests older than this are dropped as stalled
    pub stall_threshold: Duration,

    pub sweep_interval: Duration,

    pub poll_interval: Duration,

    pub timeout: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            quiet_window: Duration::from_millis(500),
            stall_threshold: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }
}

impl SettleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window = window;
        self
    }

    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Long-lived connections never finish and must not hold the page open
const IGNORED_RESOURCE_TYPES: &[&str] = &["websocket", "eventsource"];

#[derive(Debug, Clone)]
struct Inflight {
    started: Instant,
    resource_type: String,
    frame_id: Option<String>,
    url: String,
}

/// Tracks in-flight requests and when the network last went idle
#[derive(Debug)]
pub struct NetworkIdleTracker {
    config: SettleConfig,
    inflight: HashMap<String, Inflight>,
    ignored: HashSet<String>,
    idle_since: Option<Instant>,
    last_sweep: Instant,
}

impl NetworkIdleTracker {
    pub fn new(config: SettleConfig, now: Instant) -> Self {
        Self {
            config,
            inflight: HashMap::new(),
            ignored: HashSet::new(),
            idle_since: Some(now),
            last_sweep: now,
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn observe(&mut self, event: NetworkEvent, now: Instant) {
        match event {
            NetworkEvent::RequestStarted {
                request_id,
                resource_type,
                frame_id,
                url,
            } => {
                let resource_type = resource_type.to_ascii_lowercase();
                if IGNORED_RESOURCE_TYPES.contains(&resource_type.as_str()) {
                    self.ignored.insert(request_id);
                    return;
                }
                self.inflight.insert(
                    request_id,
                    Inflight {
                        started: now,
                        resource_type,
                        frame_id,
                        url,
                    },
                );
                self.idle_since = None;
            }
            NetworkEvent::RequestFinished { request_id } | NetworkEvent::RequestFailed { request_id } => {
                if self.ignored.remove(&request_id) {
                    return;
                }
                if self.inflight.remove(&request_id).is_some() {
                    self.mark_idle_if_empty(now);
                }
            }
            NetworkEvent::FrameStoppedLoading { frame_id } => {
                // documents of a finished frame never report their own completion
                let before = self.inflight.len();
                self.inflight
                    .retain(|_, req| !(req.resource_type == "document" && req.frame_id.as_deref() == Some(frame_id.as_str())));
                if self.inflight.len() != before {
                    self.mark_idle_if_empty(now);
                }
            }
        }
    }

    /// Drop requests that have been pending longer than the stall threshold
    pub fn sweep(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.config.sweep_interval {
            return;
        }
        self.last_sweep = now;

        let threshold = self.config.stall_threshold;
        let before = self.inflight.len();
        self.inflight.retain(|id, req| {
            let stalled = now.saturating_duration_since(req.started) >= threshold;
            if stalled {
                log::debug!("Dropping stalled request {} ({})", id, req.url);
            }
            !stalled
        });
        if self.inflight.len() != before {
            self.mark_idle_if_empty(now);
        }
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        self.idle_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.config.quiet_window)
    }

    fn mark_idle_if_empty(&mut self, now: Instant) {
        if self.inflight.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }
}

/// Poll `source` until the network has been quiet for the configured window.
///
/// Returns `false` when the settle timeout or `deadline` ran out first.
pub fn wait_for_settled_dom(source: &dyn NetworkEventSource, config: &SettleConfig, deadline: Option<&Deadline>) -> bool {
    let started = Instant::now();
    let mut tracker = NetworkIdleTracker::new(config.clone(), started);

    loop {
        let now = Instant::now();
        for event in source.drain() {
            tracker.observe(event, now);
        }
        tracker.sweep(now);
        if tracker.is_settled(now) {
            log::debug!("Network settled after {}ms", now.duration_since(started).as_millis());
            return true;
        }

        let budget_left = deadline.and_then(Deadline::remaining);
        if now.duration_since(started) >= config.timeout || budget_left.is_some_and(|left| left.is_zero()) {
            log::warn!(
                "Network not settled after {}ms ({} request(s) in flight), continuing",
                now.duration_since(started).as_millis(),
                tracker.inflight_count()
            );
            return false;
        }

        let mut pause = config.poll_interval;
        if let Some(left) = budget_left {
            pause = pause.min(left);
        }
        std::thread::sleep(pause);
    }
}

/// Attach an event source and wait for quiet, never failing the caller.
///
/// A source that cannot be attached counts as "not settled".
pub fn settle_best_effort<S, F>(attach: F, config: &SettleConfig, deadline: Option<&Deadline>) -> bool
where
    S: NetworkEventSource,
    F: FnOnce() -> Result<S>,
{
    match attach() {
        Ok(source) => wait_for_settled_dom(&source, config, deadline),
        Err(e) => {
            log::warn!("Could not watch network before acting, continuing: {}", e);
            false
        }
    }
}
