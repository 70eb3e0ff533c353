pub mod angle;
pub mod frame;
pub mod motion;
pub mod source;

pub use angle::joint_angle;
pub use frame::{DetectionInput, Frame, Landmark, PoseLandmarks, Side};
pub use motion::{motion_score, MotionEstimator};
pub use source::{
    ChannelSource, FrameSender, FrameSource, ImageSequenceSource, LandmarkSequenceSource,
    PoseEstimator, PoseFrameSource, PoseOptions, PushOutcome,
};
