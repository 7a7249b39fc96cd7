use crate::error::{BrowserError, Result};
use std::time::{Duration, Instant};

/// Time budget shared by every protocol round-trip of one public operation.
///
/// Checked before each call; once expired the operation aborts with
/// [`BrowserError::Timeout`] and nothing partial is returned.
#[derive(Debug, Clone)]
pub struct Deadline {
    operation: String,
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(operation: impl Into<String>, budget: Option<Duration>) -> Self {
        Self {
            operation: operation.into(),
            started: Instant::now(),
            budget,
        }
    }

    /// A deadline that never expires
    pub fn unbounded(operation: impl Into<String>) -> Self {
        Self::new(operation, None)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.budget.map(|b| b.saturating_sub(self.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_some_and(|b| self.elapsed() >= b)
    }

    /// Fail with a typed timeout if the budget is spent
    pub fn check(&self) -> Result<()> {
        match self.budget {
            Some(budget) if self.elapsed() >= budget => Err(BrowserError::Timeout {
                operation: self.operation.clone(),
                budget_ms: budget.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}
