//! Frame producers.
//!
//! A [`FrameSource`] hands the counter a channel of ticks. Channels are
//! bounded to a single pending input; producers that cannot keep up drop
//! frames instead of queueing stale ones.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::frame::{DetectionInput, Frame, PoseLandmarks};

const ENABLE_LOGS: bool = true;

const MIN_REPLAY_INTERVAL: Duration = Duration::from_millis(1);

use crate::{log_debug, log_info, log_warn};

pub trait FrameSource: Send {
    /// Opens the source. An error means the camera (or its stand-in) could
    /// not be acquired.
    fn start(&mut self) -> Result<mpsc::Receiver<DetectionInput>>;

    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The previous input is still being processed.
    Dropped,
    /// No detection run is listening.
    Inactive,
}

type SenderSlot = Arc<Mutex<Option<mpsc::Sender<DetectionInput>>>>;

/// Handle through which external code (the webview, a test) pushes ticks.
#[derive(Clone, Default)]
pub struct FrameSender {
    slot: SenderSlot,
}

impl FrameSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source wired to this sender.
    pub fn source(&self) -> ChannelSource {
        ChannelSource {
            slot: self.slot.clone(),
        }
    }

    pub fn push(&self, input: DetectionInput) -> PushOutcome {
        let guard = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            return PushOutcome::Inactive;
        };

        match sender.try_send(input) {
            Ok(()) => PushOutcome::Delivered,
            Err(TrySendError::Full(_)) => PushOutcome::Dropped,
            Err(TrySendError::Closed(_)) => PushOutcome::Inactive,
        }
    }
}

/// Source fed through a [`FrameSender`].
pub struct ChannelSource {
    slot: SenderSlot,
}

impl FrameSource for ChannelSource {
    fn start(&mut self) -> Result<mpsc::Receiver<DetectionInput>> {
        let (tx, rx) = mpsc::channel(1);
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow!("frame channel lock poisoned"))?;
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Ok(mut guard) = self.slot.lock() {
            guard.take();
        }
    }
}

/// Replays image files as camera frames, one every `interval`.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    interval: Duration,
    cancel_token: Option<CancellationToken>,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>, interval: Duration) -> Self {
        Self {
            paths,
            interval,
            cancel_token: None,
        }
    }

    /// PNG and JPEG files of `dir`, in file-name order.
    pub fn from_dir(dir: &Path, interval: Duration) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list frames in {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self::new(paths, interval))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn decode_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    Ok(Frame::from_image(image))
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> Result<mpsc::Receiver<DetectionInput>> {
        if self.paths.is_empty() {
            bail!("no frames to replay");
        }
        if self.cancel_token.is_some() {
            bail!("image sequence already playing");
        }

        let (tx, rx) = mpsc::channel(1);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let paths = self.paths.clone();
        let interval = self.interval.max(MIN_REPLAY_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for path in paths {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let decoded = tokio::task::spawn_blocking({
                    let path = path.clone();
                    move || decode_frame(&path)
                })
                .await;

                let frame = match decoded {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(err)) => {
                        log_warn!("skipping frame: {err:#}");
                        continue;
                    }
                    Err(err) => {
                        log_warn!("frame decoder task failed: {err}");
                        continue;
                    }
                };

                // Replays are lossless: wait for the counter instead of dropping.
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(DetectionInput::Frame(frame)) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            log_debug!("image sequence finished");
        });

        self.cancel_token = Some(cancel_token);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

/// Replays recorded landmark sets (`None` = no pose that tick).
pub struct LandmarkSequenceSource {
    ticks: Vec<Option<PoseLandmarks>>,
    interval: Duration,
    cancel_token: Option<CancellationToken>,
}

impl LandmarkSequenceSource {
    pub fn new(ticks: Vec<Option<PoseLandmarks>>, interval: Duration) -> Self {
        Self {
            ticks,
            interval,
            cancel_token: None,
        }
    }

    /// One JSON value per non-empty line: `null` or `{"points": [...]}`.
    pub fn from_json_lines(contents: &str, interval: Duration) -> Result<Self> {
        let ticks = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Option<PoseLandmarks>>(line)
                    .with_context(|| format!("invalid landmarks on line {}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ticks, interval))
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl FrameSource for LandmarkSequenceSource {
    fn start(&mut self) -> Result<mpsc::Receiver<DetectionInput>> {
        if self.ticks.is_empty() {
            bail!("no landmarks to replay");
        }
        if self.cancel_token.is_some() {
            bail!("landmark sequence already playing");
        }

        let (tx, rx) = mpsc::channel(1);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let ticks = self.ticks.clone();
        let interval = self.interval.max(MIN_REPLAY_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for landmarks in ticks {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(DetectionInput::Pose(landmarks)) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.cancel_token = Some(cancel_token);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseOptions {
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
}

impl From<&crate::settings::PoseSettings> for PoseOptions {
    fn from(settings: &crate::settings::PoseSettings) -> Self {
        Self {
            min_detection_confidence: settings.min_detection_confidence,
            min_tracking_confidence: settings.min_tracking_confidence,
        }
    }
}

/// External landmark model.
pub trait PoseEstimator: Send + 'static {
    fn configure(&mut self, options: &PoseOptions) -> Result<()>;

    /// Zero or one landmark set for `frame`.
    fn estimate(&mut self, frame: &Frame) -> Option<PoseLandmarks>;
}

/// Runs every frame of `inner` through a pose estimator, turning a pixel
/// source into a landmark source.
pub struct PoseFrameSource<S, E> {
    inner: S,
    estimator: Arc<Mutex<E>>,
}

impl<S: FrameSource, E: PoseEstimator> PoseFrameSource<S, E> {
    pub fn new(inner: S, mut estimator: E, options: &PoseOptions) -> Result<Self> {
        estimator
            .configure(options)
            .context("failed to configure pose estimator")?;
        Ok(Self {
            inner,
            estimator: Arc::new(Mutex::new(estimator)),
        })
    }
}

impl<S: FrameSource, E: PoseEstimator> FrameSource for PoseFrameSource<S, E> {
    fn start(&mut self) -> Result<mpsc::Receiver<DetectionInput>> {
        let mut frames = self.inner.start()?;
        let (tx, rx) = mpsc::channel(1);
        let estimator = self.estimator.clone();

        tokio::spawn(async move {
            while let Some(input) = frames.recv().await {
                let output = match input {
                    DetectionInput::Frame(frame) => {
                        let estimator = estimator.clone();
                        let estimated = tokio::task::spawn_blocking(move || {
                            let mut estimator = estimator
                                .lock()
                                .map_err(|_| anyhow!("pose estimator lock poisoned"))?;
                            Ok::<_, anyhow::Error>(estimator.estimate(&frame))
                        })
                        .await;

                        match estimated {
                            Ok(Ok(landmarks)) => DetectionInput::Pose(landmarks),
                            Ok(Err(err)) => {
                                log_warn!("pose estimation failed: {err:#}");
                                DetectionInput::Pose(None)
                            }
                            Err(err) => {
                                log_warn!("pose estimation task failed: {err}");
                                DetectionInput::Pose(None)
                            }
                        }
                    }
                    pose => pose,
                };

                if tx.send(output).await.is_err() {
                    break;
                }
            }
            log_info!("pose source closed");
        });

        Ok(rx)
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::frame::Landmark;

    struct FixedPose {
        configured: Option<PoseOptions>,
        seen: usize,
    }

    impl PoseEstimator for FixedPose {
        fn configure(&mut self, options: &PoseOptions) -> Result<()> {
            self.configured = Some(options.clone());
            Ok(())
        }

        fn estimate(&mut self, _frame: &Frame) -> Option<PoseLandmarks> {
            self.seen += 1;
            // Every other frame has nobody in view.
            (self.seen % 2 == 1).then(|| PoseLandmarks::new(vec![Landmark::new(0.5, 0.5); 33]))
        }
    }

    #[test]
    fn push_without_run_is_inactive() {
        let sender = FrameSender::new();
        assert_eq!(
            sender.push(DetectionInput::Pose(None)),
            PushOutcome::Inactive
        );
    }

    #[tokio::test]
    async fn busy_channel_drops_frames() {
        let sender = FrameSender::new();
        let mut source = sender.source();
        let mut rx = source.start().unwrap();

        assert_eq!(sender.push(DetectionInput::Pose(None)), PushOutcome::Delivered);
        assert_eq!(sender.push(DetectionInput::Pose(None)), PushOutcome::Dropped);

        assert!(rx.recv().await.is_some());
        assert_eq!(sender.push(DetectionInput::Pose(None)), PushOutcome::Delivered);

        source.stop();
        assert_eq!(sender.push(DetectionInput::Pose(None)), PushOutcome::Inactive);
    }

    #[test]
    fn empty_sequences_fail_to_start() {
        let mut images = ImageSequenceSource::new(Vec::new(), Duration::from_millis(1));
        assert!(images.start().is_err());

        let mut poses = LandmarkSequenceSource::new(Vec::new(), Duration::from_millis(1));
        assert!(poses.start().is_err());
    }

    #[test]
    fn parses_landmark_lines() {
        let contents = "null\n\n{\"points\":[{\"x\":0.1,\"y\":0.2}]}\n";
        let source = LandmarkSequenceSource::from_json_lines(contents, Duration::ZERO).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.ticks[0], None);
        let points = &source.ticks[1].as_ref().unwrap().points;
        assert_eq!(points[0].visibility, 1.0);

        assert!(LandmarkSequenceSource::from_json_lines("{oops", Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn image_sequence_replays_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for (index, shade) in [10u8, 200].into_iter().enumerate() {
            let image = image::RgbaImage::from_pixel(4, 2, image::Rgba([shade, 0, 0, 255]));
            image.save(dir.path().join(format!("frame-{index}.png"))).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::from_dir(dir.path(), Duration::from_millis(1)).unwrap();
        assert_eq!(source.len(), 2);
        let mut rx = source.start().unwrap();

        let mut shades = Vec::new();
        while let Some(DetectionInput::Frame(frame)) = rx.recv().await {
            assert_eq!(frame.dimensions(), (4, 2));
            shades.push(frame.data()[0]);
        }
        assert_eq!(shades, vec![10, 200]);
    }

    #[tokio::test]
    async fn pose_source_maps_frames_to_landmarks() {
        let sender = FrameSender::new();
        let options = PoseOptions {
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.6,
        };
        let estimator = FixedPose {
            configured: None,
            seen: 0,
        };
        let mut source = PoseFrameSource::new(sender.source(), estimator, &options).unwrap();
        assert_eq!(
            source.estimator.lock().unwrap().configured.as_ref(),
            Some(&options)
        );

        let mut rx = source.start().unwrap();
        let frame = Frame::filled(2, 2, [0; 4]);

        assert_eq!(sender.push(DetectionInput::Frame(frame.clone())), PushOutcome::Delivered);
        assert!(matches!(rx.recv().await, Some(DetectionInput::Pose(Some(_)))));

        assert_eq!(sender.push(DetectionInput::Frame(frame)), PushOutcome::Delivered);
        assert!(matches!(rx.recv().await, Some(DetectionInput::Pose(None))));

        source.stop();
        assert!(rx.recv().await.is_none());
    }
}
