//! A page: its frame topology, the sessions that own those frames, frame
//! ordinals for encoded ids, and the history of actions taken on it.
//!
//! The registry is seeded from `Page.getFrameTree`. A page given a
//! [`FrameEventSource`] keeps it current with [`Page::sync_frames`].

use crate::actions::ActionRecord;
use crate::dom::EncodedId;
use crate::error::{BrowserError, Result};
use crate::frames::{FrameEvent, FrameEventSource, FrameRegistry};
use crate::protocol::{BackendNodeId, Cdp, Deadline, ProtocolSession, RemoteObject};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct FrameOrdinals {
    by_frame: HashMap<String, usize>,
    next: usize,
}

pub struct Page {
    main_session: Arc<dyn ProtocolSession>,
    main_session_id: String,
    registry: FrameRegistry,
    sessions: HashMap<String, Arc<dyn ProtocolSession>>,
    ordinals: Mutex<FrameOrdinals>,
    /// Isolated-world execution context per frame, created on first use
    isolated_worlds: Mutex<HashMap<String, i64>>,
    history: Mutex<Vec<ActionRecord>>,
    frame_events: Option<Box<dyn FrameEventSource>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Page {
    /// Build a page around an already-populated registry
    pub fn new(main_session: Arc<dyn ProtocolSession>, registry: FrameRegistry) -> Self {
        let main_session_id = main_session.id().to_string();
        let mut sessions: HashMap<String, Arc<dyn ProtocolSession>> = HashMap::new();
        sessions.insert(main_session_id.clone(), main_session.clone());
        Self {
            main_session,
            main_session_id,
            registry,
            sessions,
            ordinals: Mutex::new(FrameOrdinals {
                by_frame: HashMap::new(),
                next: 1,
            }),
            isolated_worlds: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            frame_events: None,
        }
    }

    /// Seed the registry from the main session's `Page.getFrameTree`
    pub fn attach(main_session: Arc<dyn ProtocolSession>, deadline: &Deadline) -> Result<Self> {
        let tree = Cdp::new(main_session.as_ref(), deadline).get_frame_tree()?;
        let registry = FrameRegistry::from_frame_tree(&tree, main_session.id());
        log::debug!("Attached page with {} frame(s)", registry.len());
        Ok(Self::new(main_session, registry))
    }

    pub fn with_frame_events(mut self, source: Box<dyn FrameEventSource>) -> Self {
        self.frame_events = Some(source);
        self
    }

    /// Apply frame events buffered since the last call; returns how many
    pub fn sync_frames(&mut self) -> usize {
        let events = match &self.frame_events {
            Some(source) => source.drain(),
            None => return 0,
        };
        let count = events.len();
        for event in events {
            self.apply_frame_event(event);
        }
        count
    }

    /// Update the registry from one main-session frame event
    pub fn apply_frame_event(&mut self, event: FrameEvent) {
        log::debug!("Frame event {:?}", event);
        let navigated = match &event {
            FrameEvent::Navigated(frame) => Some(frame.id.clone()),
            _ => None,
        };
        self.registry.apply(event, &self.main_session_id);

        let mut worlds = lock(&self.isolated_worlds);
        if let Some(frame) = navigated {
            worlds.remove(&frame);
        }
        worlds.retain(|frame, _| self.registry.contains(frame));
    }

    /// Register an out-of-process iframe session and adopt its frame
    pub fn adopt_session(&mut self, session: Arc<dyn ProtocolSession>, frame_id: &str, parent_frame_id: Option<&str>) {
        let id = session.id().to_string();
        self.registry.adopt_child_session(&id, frame_id, parent_frame_id);
        self.sessions.insert(id, session);
    }

    /// Re-read the main session's frame tree after navigation
    pub fn refresh_frames(&mut self, deadline: &Deadline) -> Result<()> {
        let tree = Cdp::new(self.main_session(), deadline).get_frame_tree()?;
        self.registry.seed_from_frame_tree(&tree, &self.main_session_id);
        lock(&self.isolated_worlds).clear();
        Ok(())
    }

    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FrameRegistry {
        &mut self.registry
    }

    pub fn main_frame_id(&self) -> &str {
        self.registry.main_frame_id()
    }

    pub fn main_session(&self) -> &dyn ProtocolSession {
        self.main_session.as_ref()
    }

    pub fn session(&self, session_id: &str) -> Result<&dyn ProtocolSession> {
        self.sessions
            .get(session_id)
            .map(|s| s.as_ref())
            .ok_or_else(|| BrowserError::TabOperationFailed(format!("Unknown session '{}'", session_id)))
    }

    /// Session owning `frame_id`; frames without a recorded owner use the main session
    pub fn session_for_frame(&self, frame_id: &str) -> &dyn ProtocolSession {
        self.registry
            .owner_session_id(frame_id)
            .and_then(|id| self.sessions.get(id))
            .map(|s| s.as_ref())
            .unwrap_or_else(|| self.main_session())
    }

    /// Stable per-page ordinal: 0 for the main frame, then 1, 2, ... in
    /// first-seen order
    pub fn frame_ordinal(&self, frame_id: &str) -> usize {
        if frame_id == self.main_frame_id() {
            return 0;
        }
        let mut ordinals = lock(&self.ordinals);
        if let Some(&n) = ordinals.by_frame.get(frame_id) {
            return n;
        }
        let n = ordinals.next;
        ordinals.next += 1;
        ordinals.by_frame.insert(frame_id.to_string(), n);
        n
    }

    pub fn frame_for_ordinal(&self, ordinal: usize) -> Option<String> {
        if ordinal == 0 {
            return Some(self.main_frame_id().to_string());
        }
        lock(&self.ordinals)
            .by_frame
            .iter()
            .find(|(_, n)| **n == ordinal)
            .map(|(frame, _)| frame.clone())
    }

    pub fn encode(&self, frame_id: &str, backend_node_id: BackendNodeId) -> EncodedId {
        EncodedId::new(self.frame_ordinal(frame_id), backend_node_id)
    }

    /// Evaluate `expression` in `frame_id`'s isolated world.
    ///
    /// The world is created once per frame and reused. When the browser reports
    /// the context gone (the frame navigated), it is recreated and the
    /// evaluation retried once.
    pub fn evaluate_in_frame(
        &self,
        frame_id: &str,
        expression: &str,
        return_by_value: bool,
        deadline: &Deadline,
    ) -> Result<RemoteObject> {
        let cdp = Cdp::new(self.session_for_frame(frame_id), deadline);
        let context = self.isolated_world(&cdp, frame_id)?;
        match cdp.evaluate(expression, Some(context), return_by_value) {
            Err(e) if e.is_context_lost() => {
                log::debug!("Isolated world {} of frame {} is gone, recreating", context, frame_id);
                self.forget_isolated_world(frame_id);
                let context = self.isolated_world(&cdp, frame_id)?;
                cdp.evaluate(expression, Some(context), return_by_value)
            }
            other => other,
        }
    }

    fn isolated_world(&self, cdp: &Cdp<'_>, frame_id: &str) -> Result<i64> {
        if let Some(&context) = lock(&self.isolated_worlds).get(frame_id) {
            return Ok(context);
        }
        let context = cdp.create_isolated_world(frame_id)?;
        lock(&self.isolated_worlds).insert(frame_id.to_string(), context);
        Ok(context)
    }

    pub fn forget_isolated_world(&self, frame_id: &str) {
        lock(&self.isolated_worlds).remove(frame_id);
    }

    pub fn record_action(&self, record: ActionRecord) {
        lock(&self.history).push(record);
    }

    pub fn history(&self) -> Vec<ActionRecord> {
        lock(&self.history).clone()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("main_frame_id", &self.main_frame_id())
            .field("frames", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .field("tracks_frame_events", &self.frame_events.is_some())
            .finish()
    }
}
