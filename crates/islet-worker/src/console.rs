//! The console capture injected as `console`.

use std::sync::mpsc::Sender;

use islet_core::{LogEntry, LogLevel, WorkerMessage};

/// Reroutes the four standard log channels into structured entries posted
/// to the host.
#[derive(Debug, Clone)]
pub struct ConsoleApi {
    outbound: Sender<WorkerMessage>,
}

impl ConsoleApi {
    /// A console posting to `outbound`.
    #[must_use]
    pub fn new(outbound: Sender<WorkerMessage>) -> Self {
        Self { outbound }
    }

    fn post(&self, level: LogLevel, message: String) {
        // A closed transport means the host is tearing us down; nothing
        // useful to do with the entry.
        let _ = self.outbound.send(WorkerMessage::Log {
            data: LogEntry::new(level, message),
        });
    }

    /// `console.log`.
    pub fn log(&self, message: String) {
        self.post(LogLevel::Log, message);
    }

    /// `console.info`.
    pub fn info(&self, message: String) {
        self.post(LogLevel::Info, message);
    }

    /// `console.warn`.
    pub fn warn(&self, message: String) {
        self.post(LogLevel::Warn, message);
    }

    /// `console.error`.
    pub fn error(&self, message: String) {
        self.post(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_carry_level_and_order() {
        let (tx, rx) = std::sync::mpsc::channel();
        let console = ConsoleApi::new(tx);
        console.log("a".into());
        console.warn("b".into());

        match rx.try_recv().unwrap() {
            WorkerMessage::Log { data } => {
                assert_eq!(data.level, LogLevel::Log);
                assert_eq!(data.message, "a");
            },
            other => panic!("unexpected message: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            WorkerMessage::Log { data } => assert_eq!(data.level, LogLevel::Warn),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
