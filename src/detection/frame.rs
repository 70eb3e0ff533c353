use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CounterError;

/// Bytes per pixel in an RGBA8 buffer.
pub const CHANNELS: usize = 4;

/// One camera frame as RGBA8, row-major. Same layout as a canvas `ImageData`.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CounterError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(CounterError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a single RGBA colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgba.iter().copied().cycle().take(pixels * CHANNELS).collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Which arm to measure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// BlazePose indices of (shoulder, elbow, wrist).
    pub fn arm_indices(self) -> (usize, usize, usize) {
        match self {
            Side::Left => (11, 13, 15),
            Side::Right => (12, 14, 16),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "full_visibility")]
    pub visibility: f64,
}

fn full_visibility() -> f64 {
    1.0
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Landmark set produced by the pose estimator for one frame, indexed the
/// BlazePose way (33 points).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoseLandmarks {
    pub points: Vec<Landmark>,
}

impl PoseLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    fn arm(&self, side: Side) -> Option<(Landmark, Landmark, Landmark)> {
        let (shoulder, elbow, wrist) = side.arm_indices();
        let shoulder = *self.points.get(shoulder)?;
        let elbow = *self.points.get(elbow)?;
        let wrist = *self.points.get(wrist)?;

        if shoulder.is_finite() && elbow.is_finite() && wrist.is_finite() {
            Some((shoulder, elbow, wrist))
        } else {
            None
        }
    }

    /// Interior elbow angle for one arm, `None` when a point is missing or
    /// non-finite.
    pub fn elbow_angle(&self, side: Side) -> Option<f64> {
        let (shoulder, elbow, wrist) = self.arm(side)?;
        Some(super::angle::joint_angle(shoulder, elbow, wrist))
    }

    /// Elbow angle of the arm the estimator sees best: the one whose weakest
    /// landmark has the higher visibility. Ties go to the left arm.
    pub fn best_elbow_angle(&self) -> Option<f64> {
        let weakest = |side| {
            self.arm(side)
                .map(|(s, e, w)| s.visibility.min(e.visibility).min(w.visibility))
        };

        let side = match (weakest(Side::Left), weakest(Side::Right)) {
            (Some(left), Some(right)) if right > left => Side::Right,
            (Some(_), _) => Side::Left,
            (None, Some(_)) => Side::Right,
            (None, None) => return None,
        };

        self.elbow_angle(side)
    }
}

/// Payload of one detection tick.
#[derive(Debug, Clone)]
pub enum DetectionInput {
    Frame(Frame),
    /// `None` when the estimator found no pose in the frame.
    Pose(Option<PoseLandmarks>),
}

impl DetectionInput {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionInput::Frame(_) => "frame",
            DetectionInput::Pose(_) => "pose",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm_pose(shoulder: (f64, f64), elbow: (f64, f64), wrist: (f64, f64)) -> PoseLandmarks {
        let mut points = vec![Landmark::new(0.0, 0.0); 33];
        points[11] = Landmark::new(shoulder.0, shoulder.1);
        points[13] = Landmark::new(elbow.0, elbow.1);
        points[15] = Landmark::new(wrist.0, wrist.1);
        PoseLandmarks::new(points)
    }

    #[test]
    fn rejects_buffer_with_wrong_length() {
        let err = Frame::new(2, 2, vec![0; 15]).unwrap_err();
        match err {
            CounterError::InvalidFrame { expected, actual } => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn filled_frame_repeats_colour() {
        let frame = Frame::filled(3, 1, [1, 2, 3, 4]);
        assert_eq!(frame.data(), &[1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn missing_landmarks_yield_no_angle() {
        let pose = PoseLandmarks::new(vec![Landmark::new(0.0, 0.0); 12]);
        assert_eq!(pose.elbow_angle(Side::Left), None);
        assert_eq!(pose.best_elbow_angle(), None);
    }

    #[test]
    fn non_finite_landmark_yields_no_angle() {
        let pose = arm_pose((0.0, 0.0), (f64::NAN, 0.0), (1.0, 0.0));
        assert_eq!(pose.elbow_angle(Side::Left), None);
    }

    #[test]
    fn best_arm_prefers_higher_visibility() {
        let mut pose = arm_pose((0.0, 0.0), (0.5, 0.0), (1.0, 0.0));
        pose.points[15].visibility = 0.2;
        // Right arm bent at 90 degrees and fully visible.
        pose.points[12] = Landmark::new(0.0, 0.0);
        pose.points[14] = Landmark::new(0.5, 0.0);
        pose.points[16] = Landmark::new(0.5, 0.5);

        let angle = pose.best_elbow_angle().unwrap();
        assert!((angle - 90.0).abs() < 1e-9);
    }
}
