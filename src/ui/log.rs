//! Scrolling event log with a fixed capacity.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};

use crate::session::SessionEvent;
use crate::transport::LinkState;

pub const DEFAULT_CAPACITY: usize = 100;
pub const CLEARED_MESSAGE: &str = "Log cleared.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Success => write!(f, "success"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Newest entries last; once full, the oldest entry is discarded first.
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            at: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Empties the log, leaving a single note that it was cleared.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.push(LogLevel::Info, CLEARED_MESSAGE);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Logs the events a user would want to see. Metric updates and lifecycle
    /// changes are shown elsewhere and are skipped. Returns whether an entry
    /// was added.
    pub fn record(&mut self, event: &SessionEvent) -> bool {
        let (level, message) = match event {
            SessionEvent::Log { level, message } => (*level, message.clone()),
            SessionEvent::Link(LinkState::Connecting) => (LogLevel::Info, "Connecting...".into()),
            SessionEvent::Link(LinkState::Open) => (LogLevel::Success, "Connection open".into()),
            SessionEvent::Link(LinkState::Closed) => {
                (LogLevel::Warning, "Connection closed".into())
            }
            SessionEvent::ConfigUpdated(_) => (LogLevel::Info, "Config updated".into()),
            SessionEvent::RemoteError(message) => {
                (LogLevel::Error, format!("Service error: {message}"))
            }
            SessionEvent::ProtocolError(message) => {
                (LogLevel::Warning, format!("Dropped message: {message}"))
            }
            SessionEvent::CaptureFault(err) => {
                (LogLevel::Error, format!("Audio device error: {err}"))
            }
            SessionEvent::Lifecycle(_) | SessionEvent::Metrics(_) => return false,
        };
        self.push(level, message);
        true
    }
}
