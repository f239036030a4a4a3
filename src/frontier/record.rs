//! Frontier record definitions
//!
//! A record moves through three derived states:
//!
//! ```text
//! PENDING(attempts=0) -> COMPLETE
//!                     -> PENDING(attempts+1)   while attempts < max
//!                     -> TERMINAL(attempts=max)
//! ```
//!
//! Terminal and complete are absorbing; neither is ever returned by a batch query.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the reason a record was forced terminal
pub const TERMINAL_REASON_KEY: &str = "terminal_reason";

/// One URL tracked by a frontier collection
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub id: i64,
    pub collection: String,
    pub url: String,
    pub parent: Option<String>,

    /// Complete flag; a complete record is never re-selected
    pub status: bool,

    /// Set by any failure marking
    pub error: bool,

    /// Monotonic non-decreasing attempt counter
    pub attempts: u32,

    pub metadata: BTreeMap<String, Value>,

    /// Resume point for paginated sources
    pub current_page_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Derives the scheduling state against a retry ceiling
    pub fn state(&self, max_attempts: u32) -> RecordState {
        if self.status {
            RecordState::Complete
        } else if self.attempts >= max_attempts {
            RecordState::Terminal
        } else {
            RecordState::Pending
        }
    }

    /// Reason recorded by a terminal marking, if any
    pub fn terminal_reason(&self) -> Option<&str> {
        self.metadata.get(TERMINAL_REASON_KEY).and_then(Value::as_str)
    }
}

/// A record about to be inserted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub url: String,
    pub metadata: BTreeMap<String, Value>,
}

impl NewRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for NewRecord {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for NewRecord {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Scheduling state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Eligible for the next batch
    Pending,

    /// Processed successfully
    Complete,

    /// Attempts reached the ceiling
    Terminal,
}

impl RecordState {
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Complete | Self::Terminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

impl std::ops::AddAssign for EnqueueOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}
