//! In-memory CDP session for unit tests

use super::ProtocolSession;
use crate::error::{BrowserError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Answers CDP methods from registered closures and records every call
pub(crate) struct ScriptedSession {
    id: String,
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, method: &str, handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    pub fn on_value(self, method: &str, value: Value) -> Self {
        self.on(method, move |_| Ok(value.clone()))
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

impl ProtocolSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, method: &str, params: Value) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), params.clone()));
        }
        match self.handlers.get(method) {
            Some(handler) => handler(&params),
            None => Err(BrowserError::protocol(method, "method not scripted")),
        }
    }
}
