//! Repetition state machines.
//!
//! Both detectors are pure: they take the current [`RepetitionState`] and one
//! tick's feature value and return the next state plus the events the
//! display should react to. Nothing here touches the UI or storage.

use serde::Serialize;

use crate::settings::{MotionSettings, PoseSettings};

use super::state::RepetitionState;

/// Prompt shown by the pose variant.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PoseStatus {
    Neutral,
    /// Arms extended, waiting for the user to go down.
    Descend,
    Down,
    /// A rep was just counted.
    Validated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickEvent {
    MotionIndicator { active: bool },
    EnteredDown,
    RepCompleted { count: u32 },
    PoseStatus(PoseStatus),
    /// Nothing usable this tick; indicators go back to neutral.
    NothingDetected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: RepetitionState,
    pub events: Vec<TickEvent>,
}

impl Transition {
    fn unchanged(state: RepetitionState, events: Vec<TickEvent>) -> Self {
        Self { state, events }
    }

    pub fn completed_rep(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, TickEvent::RepCompleted { .. }))
    }
}

pub trait RepDetector: Send + Sync {
    /// Advances `state` by one tick. `feature` is `None` when the tick carried
    /// nothing measurable.
    fn advance(&self, state: RepetitionState, feature: Option<f64>) -> Transition;
}

/// Single-threshold oscillation detector over frame-difference scores.
///
/// Any score above `rep_threshold` flips between down and up, and the
/// down-to-up flip counts a rep. Sustained motion therefore keeps toggling;
/// there is deliberately no debouncing.
#[derive(Debug, Clone)]
pub struct MotionRepDetector {
    indicator_threshold: f64,
    rep_threshold: f64,
}

impl MotionRepDetector {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            indicator_threshold: settings.indicator_threshold,
            rep_threshold: settings.rep_threshold,
        }
    }
}

impl RepDetector for MotionRepDetector {
    fn advance(&self, mut state: RepetitionState, feature: Option<f64>) -> Transition {
        let Some(motion) = feature else {
            return Transition::unchanged(state, vec![TickEvent::MotionIndicator { active: false }]);
        };

        let mut events = vec![TickEvent::MotionIndicator {
            active: motion > self.indicator_threshold,
        }];

        if motion > self.rep_threshold {
            if state.is_down {
                state.is_down = false;
                state.count += 1;
                events.push(TickEvent::RepCompleted { count: state.count });
            } else {
                state.is_down = true;
                events.push(TickEvent::EnteredDown);
            }
        }

        state.last_value = motion;
        Transition { state, events }
    }
}

/// Elbow-angle detector with hysteresis: a down is only accepted after the
/// previous tick saw the arms past `ready_angle`.
#[derive(Debug, Clone)]
pub struct PoseRepDetector {
    down_angle: f64,
    up_angle: f64,
    ready_angle: f64,
}

impl PoseRepDetector {
    pub fn new(settings: &PoseSettings) -> Self {
        Self {
            down_angle: settings.down_angle,
            up_angle: settings.up_angle,
            ready_angle: settings.ready_angle,
        }
    }
}

impl RepDetector for PoseRepDetector {
    fn advance(&self, mut state: RepetitionState, feature: Option<f64>) -> Transition {
        let Some(angle) = feature else {
            return Transition::unchanged(state, vec![TickEvent::NothingDetected]);
        };

        let mut events = Vec::new();
        if angle < self.down_angle && !state.is_down && state.last_value > self.ready_angle {
            state.is_down = true;
            events.push(TickEvent::EnteredDown);
            events.push(TickEvent::PoseStatus(PoseStatus::Down));
        } else if angle > self.up_angle && state.is_down {
            state.is_down = false;
            state.count += 1;
            events.push(TickEvent::RepCompleted { count: state.count });
            events.push(TickEvent::PoseStatus(PoseStatus::Validated));
        } else if angle > self.ready_angle && !state.is_down {
            events.push(TickEvent::PoseStatus(PoseStatus::Descend));
        }

        state.last_value = angle;
        Transition { state, events }
    }
}
