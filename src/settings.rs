use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Which detection pipeline drives the counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    /// Frame differencing on raw pixels.
    #[default]
    Motion,
    /// Elbow angle from pose landmarks.
    Pose,
}

impl Variant {
    /// Length of the recent-sessions window kept in the stats blob.
    pub fn session_cap(self) -> usize {
        match self {
            Variant::Motion => 10,
            Variant::Pose => 15,
        }
    }

    pub fn storage_key(self) -> &'static str {
        match self {
            Variant::Motion => "pushup-stats",
            Variant::Pose => "pushup-stats-pose",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionSettings {
    /// Sample every `stride`-th pixel.
    pub stride: usize,
    /// Minimum red-channel change for a sample to count as moved.
    pub pixel_threshold: u8,
    pub normalization: f64,
    /// Score above which the motion indicator lights up.
    pub indicator_threshold: f64,
    /// Score above which the down/up state toggles.
    pub rep_threshold: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            stride: 4,
            pixel_threshold: 30,
            normalization: 1000.0,
            indicator_threshold: 15.0,
            rep_threshold: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PoseSettings {
    /// Elbow angle below which the body counts as down.
    pub down_angle: f64,
    /// Elbow angle above which a down position completes a rep.
    pub up_angle: f64,
    /// The previous angle must exceed this before a down is accepted.
    pub ready_angle: f64,
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            down_angle: 100.0,
            up_angle: 160.0,
            ready_angle: 140.0,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CounterSettings {
    pub variant: Variant,
    pub motion: MotionSettings,
    pub pose: PoseSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<CounterSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings at {}: {err}", path.display());
                CounterSettings::default()
            })
        } else {
            CounterSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn counter(&self) -> CounterSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_counter(&self, settings: CounterSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &CounterSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
