//! Bounded in-memory command history

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Default ring capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Durable record of one dispatch attempt; never mutated after creation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub resource_id: String,
    pub host: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub success: bool,
}

/// Append-only ring of execution records, oldest dropped first
pub struct CommandHistory {
    entries: Mutex<VecDeque<ExecutionRecord>>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest at capacity
    pub fn push(&self, record: ExecutionRecord) {
        let mut entries = self.entries.lock();
        entries.push_back(record);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// One user's records, most recent first
    pub fn for_user(&self, user_id: &str, limit: usize) -> Vec<ExecutionRecord> {
        let entries = self.entries.lock();
        entries
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// All records, most recent first. Restricting this to senior callers is
    /// the serving layer's job.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, seq: i32) -> ExecutionRecord {
        ExecutionRecord {
            timestamp: Utc::now(),
            user_id: user.to_string(),
            resource_id: "orlok".to_string(),
            host: "10.0.0.10".to_string(),
            command: format!("uptime # {}", seq),
            exit_code: Some(0),
            duration_ms: 12,
            success: true,
        }
    }

    #[test]
    fn test_most_recent_first_per_user() {
        let history = CommandHistory::new(10);
        history.push(record("igor", 1));
        history.push(record("vlad", 2));
        history.push(record("igor", 3));

        let igor = history.for_user("igor", 10);
        assert_eq!(igor.len(), 2);
        assert!(igor[0].command.ends_with("3"));
        assert!(igor[1].command.ends_with("1"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let history = CommandHistory::new(3);
        for i in 0..5 {
            history.push(record("igor", i));
        }
        assert_eq!(history.len(), 3);
        let all = history.recent(10);
        assert!(all[0].command.ends_with("4"));
        assert!(all[2].command.ends_with("2"));
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let history = CommandHistory::new(0);
        for i in 0..3 {
            history.push(record("igor", i));
        }
        assert!(history.is_empty());
    }

    #[test]
    fn test_limit_applied() {
        let history = CommandHistory::new(10);
        for i in 0..6 {
            history.push(record("igor", i));
        }
        assert_eq!(history.recent(2).len(), 2);
        assert_eq!(history.for_user("igor", 4).len(), 4);
    }
}
