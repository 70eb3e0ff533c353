//! Persisted push-up history.
//!
//! The blob keeps the field names the web counter always wrote:
//! `{"total": 13, "sessions": [{"date": "...", "count": 8}, ...]}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One finished detection run. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub date: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsStore {
    /// Running sum of every recorded session, including ones that have
    /// fallen out of `sessions`.
    pub total: u64,
    /// Most recent first.
    pub sessions: Vec<Session>,
}

impl StatsStore {
    /// Prepends `session`, trims the window to `cap` and adds to the total.
    pub fn push_session(&mut self, session: Session, cap: usize) {
        self.total = self.total.saturating_add(u64::from(session.count));
        self.sessions.insert(0, session);
        self.sessions.truncate(cap);
    }

    /// Best session still inside the window.
    pub fn record(&self) -> Option<u32> {
        self.sessions.iter().map(|session| session.count).max()
    }
}
