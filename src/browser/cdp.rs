//! [`ProtocolSession`] over a headless_chrome tab.
//!
//! headless_chrome dispatches commands through types implementing its `Method`
//! trait, one type per CDP method. The commands this crate sends are declared
//! here as thin JSON wrappers so the typed layer in `crate::protocol` owns the
//! parameter and response shapes.

use crate::actions::{NetworkEvent, NetworkEventSource};
use crate::error::{BrowserError, Result};
use crate::frames::{DetachReason, FrameEvent, FrameEventSource};
use crate::protocol::{Cdp, Deadline, ProtocolFrame, ProtocolSession};
use headless_chrome::Tab;
use headless_chrome::browser::tab::EventListener;
use headless_chrome::protocol::cdp::types::{Event, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, Weak};

macro_rules! raw_methods {
    ($($name:ident => $method:literal),* $(,)?) => {
        $(
            #[derive(Debug, Serialize, Deserialize)]
            #[serde(transparent)]
            struct $name(Value);

            impl Method for $name {
                const NAME: &'static str = $method;
                type ReturnObject = Value;
            }
        )*

        fn dispatch(tab: &Tab, method: &str, params: Value) -> Option<std::result::Result<Value, String>> {
            match method {
                $($method => Some(tab.call_method($name(params)).map_err(|e| e.to_string())),)*
                _ => None,
            }
        }

        /// CDP methods a [`TabSession`] can send
        pub const SUPPORTED_METHODS: &[&str] = &[$($method),*];
    };
}

raw_methods! {
    DomGetDocument => "DOM.getDocument",
    DomDescribeNode => "DOM.describeNode",
    DomResolveNode => "DOM.resolveNode",
    DomGetFrameOwner => "DOM.getFrameOwner",
    DomGetBoxModel => "DOM.getBoxModel",
    DomEnable => "DOM.enable",
    RuntimeEvaluate => "Runtime.evaluate",
    RuntimeCallFunctionOn => "Runtime.callFunctionOn",
    RuntimeReleaseObject => "Runtime.releaseObject",
    PageCreateIsolatedWorld => "Page.createIsolatedWorld",
    PageGetFrameTree => "Page.getFrameTree",
    PageEnable => "Page.enable",
    AccessibilityGetFullAxTree => "Accessibility.getFullAXTree",
    AccessibilityEnable => "Accessibility.enable",
    InputDispatchMouseEvent => "Input.dispatchMouseEvent",
    InputDispatchKeyEvent => "Input.dispatchKeyEvent",
    InputInsertText => "Input.insertText",
    NetworkEnable => "Network.enable",
}

/// The page target of one tab
pub struct TabSession {
    id: String,
    tab: Arc<Tab>,
}

impl TabSession {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self {
            id: tab.get_target_id().to_string(),
            tab,
        }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }
}

impl ProtocolSession for TabSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, method: &str, params: Value) -> Result<Value> {
        let params = if params.is_null() { json!({}) } else { params };
        match dispatch(&self.tab, method, params) {
            Some(result) => result.map_err(|message| BrowserError::protocol(method, message)),
            None => Err(BrowserError::protocol(method, "method not supported by tab session")),
        }
    }
}

type Listener = dyn EventListener<Event> + Send + Sync;

/// Events of one tab converted to `T` and buffered until taken.
///
/// The listener is removed when this value is dropped.
pub struct TabEvents<T> {
    tab: Arc<Tab>,
    buffer: Arc<Mutex<Vec<T>>>,
    listener: Weak<Listener>,
}

/// Network lifecycle events for DOM settling
pub type TabNetworkEvents = TabEvents<NetworkEvent>;

/// Frame attach/navigate/detach events for a page's registry
pub type TabFrameEvents = TabEvents<FrameEvent>;

impl<T: Send + 'static> TabEvents<T> {
    fn listen(tab: Arc<Tab>, domain: &str, convert: fn(&Event) -> Option<T>) -> Result<Self> {
        let session = TabSession::new(tab.clone());
        Cdp::new(&session, &Deadline::unbounded("tab events")).enable(domain)?;

        let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let listener = tab
            .add_event_listener(Arc::new(move |event: &Event| {
                if let Some(event) = convert(event) {
                    if let Ok(mut events) = sink.lock() {
                        events.push(event);
                    }
                }
            }))
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to listen for {} events: {}", domain, e)))?;

        Ok(Self { tab, buffer, listener })
    }

    fn take(&self) -> Vec<T> {
        self.buffer
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl TabEvents<NetworkEvent> {
    pub fn attach(tab: Arc<Tab>) -> Result<Self> {
        Self::listen(tab, "Network", network_event)
    }
}

impl TabEvents<FrameEvent> {
    pub fn attach(tab: Arc<Tab>) -> Result<Self> {
        Self::listen(tab, "Page", frame_event)
    }
}

impl NetworkEventSource for TabNetworkEvents {
    fn drain(&self) -> Vec<NetworkEvent> {
        self.take()
    }
}

impl FrameEventSource for TabFrameEvents {
    fn drain(&self) -> Vec<FrameEvent> {
        self.take()
    }
}

impl<T> Drop for TabEvents<T> {
    fn drop(&mut self) {
        if let Err(e) = self.tab.remove_event_listener(&self.listener) {
            log::debug!("Failed to remove event listener: {}", e);
        }
    }
}

fn network_event(event: &Event) -> Option<NetworkEvent> {
    match event {
        Event::NetworkRequestWillBeSent(e) => Some(NetworkEvent::RequestStarted {
            request_id: e.params.request_id.clone(),
            resource_type: e.params.Type.as_ref().map(|t| format!("{:?}", t)).unwrap_or_default(),
            frame_id: e.params.frame_id.clone(),
            url: e.params.request.url.clone(),
        }),
        Event::NetworkLoadingFinished(e) => Some(NetworkEvent::RequestFinished {
            request_id: e.params.request_id.clone(),
        }),
        Event::NetworkLoadingFailed(e) => Some(NetworkEvent::RequestFailed {
            request_id: e.params.request_id.clone(),
        }),
        Event::PageFrameStoppedLoading(e) => Some(NetworkEvent::FrameStoppedLoading {
            frame_id: e.params.frame_id.clone(),
        }),
        _ => None,
    }
}

fn frame_event(event: &Event) -> Option<FrameEvent> {
    match event {
        Event::PageFrameAttached(e) => Some(FrameEvent::Attached {
            frame_id: e.params.frame_id.clone(),
            parent_id: Some(e.params.parent_frame_id.clone()),
        }),
        Event::PageFrameNavigated(e) => serde_json::to_value(&e.params.frame)
            .ok()
            .and_then(|frame| frame_from_value(&frame))
            .map(FrameEvent::Navigated),
        Event::PageFrameDetached(e) => {
            let params = serde_json::to_value(&e.params).ok()?;
            frame_detached_from_value(&params)
        }
        _ => None,
    }
}

fn frame_from_value(frame: &Value) -> Option<ProtocolFrame> {
    match serde_json::from_value(frame.clone()) {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::debug!("Unreadable navigated frame: {}", e);
            None
        }
    }
}

fn frame_detached_from_value(params: &Value) -> Option<FrameEvent> {
    Some(FrameEvent::Detached {
        frame_id: params.get("frameId")?.as_str()?.to_string(),
        reason: DetachReason::from_protocol(params.get("reason").and_then(Value::as_str).unwrap_or("remove")),
    })
}
