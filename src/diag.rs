//! Diagnostic sink.
//!
//! The relocator reports problems in two ways: immediately (fatal setup
//! errors) or queued (per-relocation failures, replayed once the whole pass
//! has run so the user sees every problem at once). Messages are recorded in
//! order for callers and tests.

use tracing::{error, warn};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

/// Collects leveled diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<Message>,
    queued: Vec<Message>,
    error_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs a message immediately and records it.
    pub fn print(&mut self, level: Level, text: impl Into<String>) {
        let text = text.into();
        emit(level, &text);
        self.push(Message { level, text });
    }

    /// Records a message without logging it yet; `flush` replays queued
    /// messages in the order they were queued.
    pub fn queue(&mut self, level: Level, text: impl Into<String>) {
        let msg = Message {
            level,
            text: text.into(),
        };
        self.queued.push(msg.clone());
        self.push(msg);
    }

    /// Logs all queued messages in queue order and forgets the queue.
    pub fn flush(&mut self) {
        for msg in self.queued.drain(..) {
            emit(msg.level, &msg.text);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Every message recorded so far, printed or queued, in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn push(&mut self, msg: Message) {
        if msg.level == Level::Error {
            self.error_count += 1;
        }
        self.messages.push(msg);
    }
}

fn emit(level: Level, text: &str) {
    match level {
        Level::Warning => warn!("{}", text),
        Level::Error => error!("{}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut diag = Diagnostics::new();
        diag.queue(Level::Error, "first");
        diag.print(Level::Warning, "second");
        diag.queue(Level::Error, "third");

        let texts: Vec<_> = diag.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);
        assert!(diag.has_errors());
    }

    #[test]
    fn flush_drains_queue_but_keeps_record() {
        let mut diag = Diagnostics::new();
        diag.queue(Level::Warning, "queued");
        diag.flush();
        diag.flush();
        assert_eq!(diag.messages().len(), 1);
        assert!(!diag.has_errors());
    }
}
