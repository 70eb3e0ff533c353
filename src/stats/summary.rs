//! Display-ready statistics derived from the stats blob.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use super::models::StatsStore;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Badge {
    Default,
    Silver,
    Gold,
    Trophy,
}

impl Badge {
    pub fn for_count(count: u32) -> Self {
        if count >= 50 {
            Badge::Trophy
        } else if count >= 30 {
            Badge::Gold
        } else if count >= 20 {
            Badge::Silver
        } else {
            Badge::Default
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Badge::Default => "💪",
            Badge::Silver => "🥈",
            Badge::Gold => "🥇",
            Badge::Trophy => "🏆",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub count: u32,
    pub date: DateTime<Utc>,
    pub date_label: String,
    pub badge: Badge,
    pub emoji: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total: u64,
    pub session_count: usize,
    /// `None` while there is no session to show.
    pub record: Option<u32>,
    pub history: Vec<HistoryEntry>,
}

impl StatsSummary {
    pub fn from_store<Tz: TimeZone>(stats: &StatsStore, now: &DateTime<Tz>) -> Self {
        let history = stats
            .sessions
            .iter()
            .map(|session| {
                let badge = Badge::for_count(session.count);
                HistoryEntry {
                    count: session.count,
                    date: session.date,
                    date_label: format_session_date(session.date, now),
                    badge,
                    emoji: badge.emoji(),
                }
            })
            .collect();

        Self {
            total: stats.total,
            session_count: stats.sessions.len(),
            record: stats.record(),
            history,
        }
    }
}

/// "Today", "Yesterday", or a short day-month label. The year is appended
/// when it differs from `now`'s.
pub fn format_session_date<Tz: TimeZone>(date: DateTime<Utc>, now: &DateTime<Tz>) -> String {
    let local = date.with_timezone(&now.timezone());
    let elapsed = now.clone().signed_duration_since(local.clone());

    match elapsed.num_days() {
        0 if elapsed.num_milliseconds() >= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        _ if local.year() != now.year() => local.naive_local().format("%-d %b %Y").to_string(),
        _ => local.naive_local().format("%-d %b").to_string(),
    }
}
