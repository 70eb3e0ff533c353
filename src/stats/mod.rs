pub mod models;
pub mod recorder;
pub mod store;
pub mod summary;

pub use models::{Session, StatsStore};
pub use recorder::SessionRecorder;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use summary::{format_session_date, Badge, HistoryEntry, StatsSummary};
