use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::settings::Variant;

use super::{
    models::{Session, StatsStore},
    store::KeyValueStore,
    summary::StatsSummary,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Appends finished sessions to the stats blob of one variant.
#[derive(Clone)]
pub struct SessionRecorder {
    storage: Arc<dyn KeyValueStore>,
    key: &'static str,
    cap: usize,
}

impl SessionRecorder {
    pub fn new(storage: Arc<dyn KeyValueStore>, variant: Variant) -> Self {
        Self {
            storage,
            key: variant.storage_key(),
            cap: variant.session_cap(),
        }
    }

    /// Current blob. Missing, unreadable or unparsable data loads as empty.
    pub fn load(&self) -> StatsStore {
        let raw = match self.storage.get(self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StatsStore::default(),
            Err(err) => {
                log_warn!("Failed to read {}: {err:#}; using empty stats", self.key);
                return StatsStore::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            log_warn!("Stored {} is corrupt ({err}); using empty stats", self.key);
            StatsStore::default()
        })
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from_store(&self.load(), &Local::now())
    }

    /// Records a session of `count` reps stamped now. Counts of zero or
    /// below leave the store untouched and return `None`.
    pub fn record_session(&self, count: i64) -> Result<Option<StatsSummary>> {
        self.record_session_at(count, Utc::now())
    }

    pub fn record_session_at(
        &self,
        count: i64,
        date: DateTime<Utc>,
    ) -> Result<Option<StatsSummary>> {
        if count <= 0 {
            return Ok(None);
        }
        let count = u32::try_from(count)
            .with_context(|| format!("session count {count} out of range"))?;

        let mut stats = self.load();
        stats.push_session(Session { date, count }, self.cap);

        let serialized = serde_json::to_string(&stats)?;
        self.storage
            .set(self.key, &serialized)
            .with_context(|| format!("failed to persist {}", self.key))?;

        log_info!(
            "Recorded session of {count} reps (total {}, {} in history)",
            stats.total,
            stats.sessions.len()
        );

        Ok(Some(self.summary()))
    }
}
