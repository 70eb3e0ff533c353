#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod events;
pub mod loop_worker;
pub mod machine;
pub mod state;

pub use controller::{CounterController, CounterSnapshot};
pub use events::{CounterEvent, EventSink, LogSink, MemorySink};
pub use machine::{MotionRepDetector, PoseRepDetector, PoseStatus, RepDetector, TickEvent, Transition};
pub use state::{CounterState, CounterStatus, RepetitionState};
