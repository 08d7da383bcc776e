//! Message board storage with flat-file persistence.
//!
//! Provides a thread-safe append-only message log shared by all sessions:
//! - In-memory store guarded by a mutex around every read-modify-append
//! - Best-effort persistence to a flat file (failures logged, not retried)
//! - Bounded retention: oldest messages drop beyond the configured cap

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One posted board message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Posting user.
    pub user: String,
    /// Formatted post time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Message body, verbatim as posted.
    pub content: String,
}

impl Message {
    /// Render the flat-file / read-back line format.
    fn render(&self) -> String {
        format!("[{}] {}: {}\n", self.timestamp, self.user, self.content)
    }

    /// Parse one persisted line, `[timestamp] user: content`.
    /// Malformed lines are skipped by the loader.
    fn parse(line: &str) -> Option<Message> {
        let rest = line.strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once(']')?;
        let (user, content) = rest.trim_start().split_once(':')?;
        Some(Message {
            user: user.trim().to_string(),
            timestamp: timestamp.to_string(),
            content: content.trim().to_string(),
        })
    }
}

/// Thread-safe append-only message store.
pub struct MessageStore {
    /// The in-memory log, oldest first.
    messages: Mutex<Vec<Message>>,
    /// Retention cap; oldest entries drop beyond this.
    max_messages: usize,
    /// Backing flat file. `None` disables persistence.
    path: Option<PathBuf>,
}

impl MessageStore {
    /// Create a store, loading any existing messages from the backing file.
    pub fn new(max_messages: usize, path: Option<PathBuf>) -> Self {
        let store = MessageStore {
            messages: Mutex::new(Vec::new()),
            max_messages,
            path,
        };
        store.load();
        store
    }

    /// Load persisted messages. A missing file is not an error.
    fn load(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => return,
        };

        let mut messages = self.messages.lock().expect("message lock poisoned");
        messages.clear();
        for line in data.lines() {
            if let Some(msg) = Message::parse(line) {
                messages.push(msg);
            }
        }
        info!(count = messages.len(), path = %path.display(), "Loaded message log");
    }

    /// Append a message under `user`, timestamped now.
    ///
    /// The in-memory append always takes effect; the file write is
    /// best-effort and a failure is logged without rollback.
    pub fn append(&self, user: &str, content: &str) {
        let msg = Message {
            user: user.to_string(),
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            content: content.to_string(),
        };

        let mut messages = self.messages.lock().expect("message lock poisoned");
        messages.push(msg.clone());
        if messages.len() > self.max_messages {
            let excess = messages.len() - self.max_messages;
            messages.drain(..excess);
        }

        // File append stays under the lock so persisted order matches
        // in-memory order across concurrent posters.
        if let Some(ref path) = self.path {
            let result = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .and_then(|mut f| f.write_all(msg.render().as_bytes()));
            if let Err(e) = result {
                warn!(error = %e, path = %path.display(), "Failed to persist message");
            }
        }

        debug!(user, "Message appended");
    }

    /// Return up to `limit` most recent messages in chronological order,
    /// newest last.
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let messages = self.messages.lock().expect("message lock poisoned");
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.lock().expect("message lock poisoned").len()
    }

    /// Whether the store holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
