use chrono::{DateTime, Local};

/// Oldest entries are dropped past this many.
pub const ACTIVITY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ActivityItem {
    pub title: String,
    pub message: String,
    pub level: Level,
    pub timestamp: DateTime<Local>,
}

/// Local log of what the client did, newest first.
pub struct ActivityLog {
    pub items: Vec<ActivityItem>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, title: impl Into<String>, message: impl Into<String>, level: Level) {
        self.items.insert(
            0,
            ActivityItem {
                title: title.into(),
                message: message.into(),
                level,
                timestamp: Local::now(),
            },
        );
        if self.items.len() > ACTIVITY_LIMIT {
            self.items.pop();
        }
    }
}
