//! Destinations for diagnostic output produced while evaluating
//! (`builtins.trace`).

use std::cell::RefCell;

/// Receives diagnostic messages from the runtime
pub trait DebugSink {
    fn debug(&self, message: &str);
}

/// Forwards messages to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "nixrt::trace", "{}", message);
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: RefCell<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl DebugSink for MemorySink {
    fn debug(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
