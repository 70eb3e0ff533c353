use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Variant;

/// Feature value the counter starts from: no wide angle or motion seen yet.
pub const NEUTRAL_VALUE: f64 = 0.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CounterStatus {
    #[default]
    Idle,
    Running,
}

/// State advanced by exactly one tick at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepetitionState {
    pub is_down: bool,
    pub count: u32,
    /// Motion score or elbow angle of the last tick that had one.
    pub last_value: f64,
}

impl Default for RepetitionState {
    fn default() -> Self {
        Self {
            is_down: false,
            count: 0,
            last_value: NEUTRAL_VALUE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub status: CounterStatus,
    pub variant: Variant,
    pub run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub reps: RepetitionState,
    /// Set once the current count has been written to the stats, so a later
    /// reset does not record it twice.
    #[serde(skip)]
    pub flushed: bool,
}

impl CounterState {
    pub fn new(variant: Variant) -> Self {
        Self {
            status: CounterStatus::Idle,
            variant,
            run_id: None,
            started_at: None,
            reps: RepetitionState::default(),
            flushed: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == CounterStatus::Running
    }

    pub fn begin_run(&mut self, run_id: String, started_at: DateTime<Utc>) {
        *self = Self {
            status: CounterStatus::Running,
            variant: self.variant,
            run_id: Some(run_id),
            started_at: Some(started_at),
            reps: RepetitionState::default(),
            flushed: false,
        };
    }

    /// Ends the run. The count stays visible until the next reset or run.
    pub fn stop(&mut self) {
        self.status = CounterStatus::Idle;
    }

    /// Count not yet written to the stats.
    pub fn unsaved_count(&self) -> u32 {
        if self.flushed {
            0
        } else {
            self.reps.count
        }
    }

    pub fn reset_reps(&mut self) {
        self.reps = RepetitionState::default();
        self.flushed = false;
    }
}
