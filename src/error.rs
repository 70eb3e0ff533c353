use thiserror::Error;

/// Message shown when the camera cannot be opened.
pub const CAMERA_UNAVAILABLE: &str = "Unable to access the camera. Check the permissions.";

#[derive(Debug, Error)]
pub enum CounterError {
    /// Frame source unavailable or denied. Detection does not start.
    #[error("{0}")]
    Acquisition(String),

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("stats storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CounterError {
    pub fn acquisition(reason: impl std::fmt::Display) -> Self {
        log::error!("camera acquisition failed: {reason}");
        CounterError::Acquisition(CAMERA_UNAVAILABLE.to_string())
    }
}
