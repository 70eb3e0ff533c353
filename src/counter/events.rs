use std::sync::Mutex;

use serde::Serialize;

use crate::stats::StatsSummary;

use super::machine::{PoseStatus, TickEvent};

/// Display-facing notifications. The display surface only consumes these;
/// nothing flows back into the counter.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CounterEvent {
    DetectionStarted { run_id: String },
    DetectionStopped { run_id: String, count: u32 },
    MotionIndicator { active: bool },
    PositionIndicator { down: bool },
    PoseStatus { status: PoseStatus },
    CountChanged { count: u32 },
    /// Counter text enlarged on change, shrunk back shortly after.
    CounterPulse { enlarged: bool },
    StatsUpdated { summary: StatsSummary },
    Error { message: String },
}

impl CounterEvent {
    /// Event name used on the desktop event bus.
    pub fn name(&self) -> &'static str {
        match self {
            CounterEvent::DetectionStarted { .. } => "detection-started",
            CounterEvent::DetectionStopped { .. } => "detection-stopped",
            CounterEvent::MotionIndicator { .. } => "motion-indicator",
            CounterEvent::PositionIndicator { .. } => "position-indicator",
            CounterEvent::PoseStatus { .. } => "pose-status",
            CounterEvent::CountChanged { .. } => "count-changed",
            CounterEvent::CounterPulse { .. } => "counter-pulse",
            CounterEvent::StatsUpdated { .. } => "stats-updated",
            CounterEvent::Error { .. } => "counter-error",
        }
    }

    /// Display events for one state-machine event.
    pub fn from_tick(event: TickEvent) -> Vec<CounterEvent> {
        match event {
            TickEvent::MotionIndicator { active } => vec![CounterEvent::MotionIndicator { active }],
            TickEvent::EnteredDown => vec![CounterEvent::PositionIndicator { down: true }],
            TickEvent::RepCompleted { count } => vec![
                CounterEvent::PositionIndicator { down: false },
                CounterEvent::CountChanged { count },
            ],
            TickEvent::PoseStatus(status) => vec![CounterEvent::PoseStatus { status }],
            TickEvent::NothingDetected => vec![
                CounterEvent::MotionIndicator { active: false },
                CounterEvent::PositionIndicator { down: false },
                CounterEvent::PoseStatus {
                    status: PoseStatus::Neutral,
                },
            ],
        }
    }
}

/// Display surface. Fire-and-forget.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CounterEvent);
}

/// Writes events to the log; used by the headless runner.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &CounterEvent) {
        match event {
            CounterEvent::CountChanged { count } => log::info!("count: {count}"),
            CounterEvent::Error { message } => log::error!("{message}"),
            other => log::debug!("{}: {:?}", other.name(), other),
        }
    }
}

/// Keeps every emitted event in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<CounterEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CounterEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &CounterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(feature = "desktop")]
impl EventSink for tauri::AppHandle {
    fn emit(&self, event: &CounterEvent) {
        use tauri::Emitter;

        if let Err(err) = Emitter::emit(self, event.name(), event) {
            log::warn!("failed to emit {}: {err}", event.name());
        }
    }
}
