use crate::settings::MotionSettings;

use super::frame::{Frame, CHANNELS};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Fraction of sampled pixels whose reference channel moved past
/// `pixel_threshold`, scaled by `normalization`.
///
/// Samples the red channel of every `stride`-th pixel. Buffers must have the
/// same length; the shorter one bounds the walk otherwise.
pub fn motion_score(previous: &[u8], current: &[u8], sampling: &MotionSettings) -> f64 {
    let step = sampling.stride.max(1) * CHANNELS;
    let len = previous.len().min(current.len());

    let changed = (0..len)
        .step_by(step)
        .filter(|&i| previous[i].abs_diff(current[i]) > sampling.pixel_threshold)
        .count();

    changed as f64 / sampling.normalization
}

/// Keeps the previous frame for one tick and diffs each new frame against it.
#[derive(Debug)]
pub struct MotionEstimator {
    sampling: MotionSettings,
    previous: Option<Frame>,
}

impl MotionEstimator {
    pub fn new(sampling: MotionSettings) -> Self {
        Self {
            sampling,
            previous: None,
        }
    }

    /// Motion score against the cached frame, `None` on the first frame or
    /// after a resolution change. The current frame always becomes the cache.
    pub fn estimate(&mut self, frame: Frame) -> Option<f64> {
        let score = match self.previous.as_ref() {
            Some(previous) if previous.dimensions() == frame.dimensions() => Some(motion_score(
                previous.data(),
                frame.data(),
                &self.sampling,
            )),
            Some(previous) => {
                log_debug!(
                    "frame size changed from {:?} to {:?}; resetting motion cache",
                    previous.dimensions(),
                    frame.dimensions()
                );
                None
            }
            None => None,
        };

        self.previous = Some(frame);
        score
    }

    pub fn clear(&mut self) {
        self.previous = None;
    }
}
