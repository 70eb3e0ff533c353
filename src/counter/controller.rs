use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    detection::{DetectionInput, FrameSource, MotionEstimator},
    error::CounterError,
    settings::{CounterSettings, Variant},
    stats::{KeyValueStore, SessionRecorder, StatsSummary},
    utils::logging::tick_tracing_enabled,
};

use super::{
    events::{CounterEvent, EventSink},
    loop_worker::detection_loop,
    machine::{MotionRepDetector, PoseRepDetector, PoseStatus, RepDetector, TickEvent},
    state::{CounterState, CounterStatus, RepetitionState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const COUNTER_PULSE: Duration = Duration::from_millis(200);
const VALIDATED_FLASH: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub status: CounterStatus,
    pub variant: Variant,
    pub run_id: Option<String>,
    pub count: u32,
    pub is_down: bool,
    pub last_value: f64,
}

impl From<&CounterState> for CounterSnapshot {
    fn from(state: &CounterState) -> Self {
        Self {
            status: state.status,
            variant: state.variant,
            run_id: state.run_id.clone(),
            count: state.reps.count,
            is_down: state.reps.is_down,
            last_value: state.reps.last_value,
        }
    }
}

/// Turns one tick's input into the feature value its state machine reads.
enum Pipeline {
    Motion {
        estimator: MotionEstimator,
        detector: MotionRepDetector,
    },
    Pose {
        detector: PoseRepDetector,
    },
}

impl Pipeline {
    fn new(settings: &CounterSettings) -> Self {
        match settings.variant {
            Variant::Motion => Pipeline::Motion {
                estimator: MotionEstimator::new(settings.motion.clone()),
                detector: MotionRepDetector::new(&settings.motion),
            },
            Variant::Pose => Pipeline::Pose {
                detector: PoseRepDetector::new(&settings.pose),
            },
        }
    }

    fn feature(&mut self, input: DetectionInput) -> Option<f64> {
        match (self, input) {
            (Pipeline::Motion { estimator, .. }, DetectionInput::Frame(frame)) => {
                estimator.estimate(frame)
            }
            (Pipeline::Pose { .. }, DetectionInput::Pose(landmarks)) => {
                landmarks.and_then(|landmarks| landmarks.best_elbow_angle())
            }
            (_, input) => {
                log_debug!("ignoring {} input the active variant cannot read", input.kind());
                None
            }
        }
    }

    fn detector(&self) -> &dyn RepDetector {
        match self {
            Pipeline::Motion { detector, .. } => detector,
            Pipeline::Pose { detector } => detector,
        }
    }

    fn clear(&mut self) {
        if let Pipeline::Motion { estimator, .. } = self {
            estimator.clear();
        }
    }

    /// Events that put every indicator back to rest.
    fn rest_events(&self) -> Vec<CounterEvent> {
        match self {
            Pipeline::Motion { .. } => vec![
                CounterEvent::MotionIndicator { active: false },
                CounterEvent::PositionIndicator { down: false },
            ],
            Pipeline::Pose { .. } => vec![
                CounterEvent::PositionIndicator { down: false },
                CounterEvent::PoseStatus {
                    status: PoseStatus::Neutral,
                },
            ],
        }
    }
}

struct CounterInner {
    state: CounterState,
    pipeline: Pipeline,
    recorder: SessionRecorder,
}

struct RunHandle {
    run_id: String,
    source: Box<dyn FrameSource>,
    cancel_token: CancellationToken,
    source_closed: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the repetition state and the detection run lifecycle.
///
/// Ticks, resets and lifecycle changes all go through the same lock, so the
/// state machine never sees two ticks at once.
#[derive(Clone)]
pub struct CounterController {
    inner: Arc<Mutex<CounterInner>>,
    run: Arc<Mutex<Option<RunHandle>>>,
    storage: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
    trace_ticks: bool,
}

impl CounterController {
    pub fn new(
        settings: CounterSettings,
        storage: Arc<dyn KeyValueStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let inner = CounterInner {
            state: CounterState::new(settings.variant),
            pipeline: Pipeline::new(&settings),
            recorder: SessionRecorder::new(storage.clone(), settings.variant),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            run: Arc::new(Mutex::new(None)),
            storage,
            sink,
            trace_ticks: tick_tracing_enabled(),
        }
    }

    pub async fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::from(&self.inner.lock().await.state)
    }

    pub async fn stats(&self) -> StatsSummary {
        self.inner.lock().await.recorder.summary()
    }

    /// Swaps thresholds and variant. Only allowed while idle.
    pub async fn reconfigure(&self, settings: &CounterSettings) -> Result<(), CounterError> {
        let run = self.run.lock().await;
        if run.is_some() {
            return Err(anyhow!("cannot change settings while detection is running").into());
        }

        let mut inner = self.inner.lock().await;
        inner.state = CounterState::new(settings.variant);
        inner.pipeline = Pipeline::new(settings);
        inner.recorder = SessionRecorder::new(self.storage.clone(), settings.variant);
        drop(inner);
        drop(run);

        log_info!("Counter reconfigured for {:?} detection", settings.variant);
        self.emit(CounterEvent::CountChanged { count: 0 });
        self.emit(CounterEvent::StatsUpdated {
            summary: self.stats().await,
        });
        Ok(())
    }

    /// Starts a detection run fed by `source`. Calling it while a run is
    /// active leaves that run alone and returns its snapshot.
    pub async fn start_detection(
        &self,
        mut source: Box<dyn FrameSource>,
    ) -> Result<CounterSnapshot, CounterError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            log_debug!("start_detection ignored: already running");
            return Ok(self.snapshot().await);
        }

        let frames = match source.start() {
            Ok(frames) => frames,
            Err(err) => {
                let error = CounterError::acquisition(format!("{err:#}"));
                self.emit(CounterEvent::Error {
                    message: error.to_string(),
                });
                return Err(error);
            }
        };

        let run_id = Uuid::new_v4().to_string();
        let snapshot = {
            let mut inner = self.inner.lock().await;
            inner.state.begin_run(run_id.clone(), Utc::now());
            inner.pipeline.clear();
            CounterSnapshot::from(&inner.state)
        };

        let cancel_token = CancellationToken::new();
        let source_closed = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(
            run_id.clone(),
            self.clone(),
            frames,
            cancel_token.clone(),
            source_closed.clone(),
        ));

        *run = Some(RunHandle {
            run_id: run_id.clone(),
            source,
            cancel_token,
            source_closed,
            handle,
        });
        drop(run);

        log_info!("Detection run {run_id} started ({:?})", snapshot.variant);
        self.emit(CounterEvent::DetectionStarted { run_id });
        self.emit(CounterEvent::CountChanged { count: 0 });

        Ok(snapshot)
    }

    /// Stops the current run and records its count. A no-op returning `None`
    /// when nothing is running.
    pub async fn stop_detection(&self) -> Result<Option<StatsSummary>, CounterError> {
        let mut run = self.run.lock().await;
        let Some(active) = run.take() else {
            log_debug!("stop_detection ignored: not running");
            return Ok(None);
        };

        let RunHandle {
            run_id,
            mut source,
            cancel_token,
            source_closed,
            handle,
        } = active;

        cancel_token.cancel();
        if let Err(err) = handle.await {
            log_warn!("detection loop for run {run_id} ended abnormally: {err}");
        }
        source.stop();
        source_closed.cancel();

        let (count, rest, recorded) = {
            let mut inner = self.inner.lock().await;
            inner.state.stop();

            let count = inner.state.reps.count;
            let unsaved = inner.state.unsaved_count();
            let recorded = if unsaved > 0 {
                let result = inner.recorder.record_session(i64::from(unsaved));
                if result.is_ok() {
                    inner.state.flushed = true;
                }
                result.map_err(CounterError::Storage)
            } else {
                Ok(None)
            };

            (count, inner.pipeline.rest_events(), recorded)
        };
        drop(run);

        // The run is over either way; the count stays unsaved on failure.
        for event in rest {
            self.emit(event);
        }
        self.emit(CounterEvent::DetectionStopped {
            run_id: run_id.clone(),
            count,
        });

        match &recorded {
            Ok(Some(summary)) => self.emit(CounterEvent::StatsUpdated {
                summary: summary.clone(),
            }),
            Ok(None) => {}
            Err(err) => {
                log_error!("failed to record run {run_id}: {err:#}");
                self.emit(CounterEvent::Error {
                    message: err.to_string(),
                });
            }
        }

        log_info!("Detection run {run_id} stopped at {count} reps");
        recorded
    }

    /// Zeroes the counter. With `save`, an unsaved count is recorded first.
    pub async fn reset_counter(&self, save: bool) -> Result<Option<StatsSummary>, CounterError> {
        let (recorded, rest) = {
            let mut inner = self.inner.lock().await;
            let unsaved = inner.state.unsaved_count();

            let recorded = if save && unsaved > 0 {
                inner
                    .recorder
                    .record_session(i64::from(unsaved))
                    .map_err(CounterError::Storage)?
            } else {
                None
            };

            inner.state.reset_reps();
            (recorded, inner.pipeline.rest_events())
        };

        log_info!("Counter reset (saved: {})", recorded.is_some());
        self.emit(CounterEvent::CountChanged { count: 0 });
        self.pulse_counter();
        for event in rest {
            self.emit(event);
        }
        if let Some(summary) = &recorded {
            self.emit(CounterEvent::StatsUpdated {
                summary: summary.clone(),
            });
        }

        Ok(recorded)
    }

    /// Advances the state machine by one tick. Returns `None` when no run is
    /// active, in which case the input is discarded.
    pub async fn on_tick(
        &self,
        input: DetectionInput,
    ) -> Result<Option<RepetitionState>, CounterError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running() {
            return Ok(None);
        }

        let feature = inner.pipeline.feature(input);
        if self.trace_ticks {
            log::debug!("tick feature: {feature:?}");
        }

        let transition = inner.pipeline.detector().advance(inner.state.reps, feature);
        if transition.completed_rep() {
            inner.state.flushed = false;
        }
        inner.state.reps = transition.state;

        for event in transition.events {
            if let TickEvent::RepCompleted { count } = event {
                log_debug!("rep {count} completed");
                self.pulse_counter();
            }
            if event == TickEvent::PoseStatus(PoseStatus::Validated) {
                self.revert_after(
                    VALIDATED_FLASH,
                    CounterEvent::PoseStatus {
                        status: PoseStatus::Neutral,
                    },
                );
            }
            for display in CounterEvent::from_tick(event) {
                self.emit(display);
            }
        }

        Ok(Some(transition.state))
    }

    /// Reports a camera failure raised outside a [`FrameSource`] (e.g. by
    /// the webview) to the display.
    pub fn fail_acquisition(&self, reason: &str) -> CounterError {
        let error = CounterError::acquisition(reason);
        self.emit(CounterEvent::Error {
            message: error.to_string(),
        });
        error
    }

    /// Resolves once the active run's source has no more input.
    pub async fn wait_for_source_end(&self) {
        let token = match self.run.lock().await.as_ref() {
            Some(run) => run.source_closed.clone(),
            None => return,
        };
        token.cancelled().await;
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    fn emit(&self, event: CounterEvent) {
        self.sink.emit(&event);
    }

    fn pulse_counter(&self) {
        self.emit(CounterEvent::CounterPulse { enlarged: true });
        self.revert_after(COUNTER_PULSE, CounterEvent::CounterPulse { enlarged: false });
    }

    /// Emits `event` after `delay`. Purely cosmetic; firing after a reset
    /// or stop is harmless.
    fn revert_after(&self, delay: Duration, event: CounterEvent) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink.emit(&event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        counter::events::MemorySink,
        detection::{Frame, FrameSender, Landmark, PoseLandmarks},
        stats::{JsonFileStore, MemoryStore},
    };

    fn controller(variant: Variant) -> (CounterController, Arc<MemorySink>, Arc<MemoryStore>) {
        let settings = CounterSettings {
            variant,
            ..CounterSettings::default()
        };
        let sink = Arc::new(MemorySink::new());
        let storage = Arc::new(MemoryStore::new());
        let controller = CounterController::new(settings, storage.clone(), sink.clone());
        (controller, sink, storage)
    }

    fn arm_at(angle_degrees: f64) -> DetectionInput {
        let mut points = vec![Landmark::new(0.0, 0.0); 33];
        let radians = angle_degrees.to_radians();
        points[11] = Landmark::new(1.0, 0.0);
        points[13] = Landmark::new(0.0, 0.0);
        points[15] = Landmark::new(radians.cos(), radians.sin());
        DetectionInput::Pose(Some(PoseLandmarks::new(points)))
    }

    /// Frame whose first `changed` sampled pixels are bright.
    fn motion_frame(changed: usize) -> DetectionInput {
        let mut frame = Frame::filled(640, 480, [0, 0, 0, 255]);
        for sample in 0..changed {
            frame.data_mut()[sample * 16] = 255;
        }
        DetectionInput::Frame(frame)
    }

    #[tokio::test]
    async fn ticks_are_ignored_while_idle() {
        let (controller, _, _) = controller(Variant::Pose);
        assert_eq!(controller.on_tick(arm_at(90.0)).await.unwrap(), None);
        assert_eq!(controller.snapshot().await.status, CounterStatus::Idle);
    }

    #[tokio::test]
    async fn motion_run_counts_and_records_on_stop() {
        let (controller, sink, _) = controller(Variant::Motion);
        let sender = FrameSender::new();
        controller
            .start_detection(Box::new(sender.source()))
            .await
            .unwrap();

        // Reference frame, then alternate between still and 30_000 changed samples.
        controller.on_tick(motion_frame(0)).await.unwrap();
        let down = controller.on_tick(motion_frame(30_000)).await.unwrap().unwrap();
        assert!(down.is_down);
        assert_eq!(down.count, 0);

        let up = controller.on_tick(motion_frame(4_000)).await.unwrap().unwrap();
        assert!(!up.is_down);
        assert_eq!(up.count, 1);

        let summary = controller.stop_detection().await.unwrap().unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.history[0].count, 1);

        let events = sink.events();
        assert!(events.contains(&CounterEvent::CountChanged { count: 1 }));
        assert!(events.contains(&CounterEvent::MotionIndicator { active: false }));
        assert!(matches!(
            events.iter().rev().find(|e| matches!(e, CounterEvent::DetectionStopped { .. })),
            Some(CounterEvent::DetectionStopped { count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn stop_twice_is_same_as_once() {
        let (controller, sink, _) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }

        assert!(controller.stop_detection().await.unwrap().is_some());
        let events_after_first = sink.events().len();

        assert!(controller.stop_detection().await.unwrap().is_none());
        assert_eq!(sink.events().len(), events_after_first);
        assert_eq!(controller.stats().await.total, 1);
    }

    #[tokio::test]
    async fn start_while_running_keeps_the_run() {
        let (controller, _, _) = controller(Variant::Pose);
        let first = controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        controller.on_tick(arm_at(170.0)).await.unwrap();

        let second = controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        assert_eq!(first.run_id, second.run_id);
        assert_eq!(second.last_value.round(), 170.0);

        controller.stop_detection().await.unwrap();
    }

    #[tokio::test]
    async fn reset_with_save_records_once() {
        let (controller, _, _) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }
        assert_eq!(controller.snapshot().await.count, 2);

        let saved = controller.reset_counter(true).await.unwrap().unwrap();
        assert_eq!(saved.total, 2);
        assert_eq!(controller.snapshot().await.count, 0);

        // Nothing new since the reset, so stopping records nothing.
        assert!(controller.stop_detection().await.unwrap().is_none());
        assert_eq!(controller.stats().await.total, 2);
    }

    #[tokio::test]
    async fn reset_after_stop_does_not_record_again() {
        let (controller, _, _) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }
        controller.stop_detection().await.unwrap();
        assert_eq!(controller.snapshot().await.count, 1);

        assert!(controller.reset_counter(true).await.unwrap().is_none());
        assert_eq!(controller.stats().await.total, 1);
        assert_eq!(controller.snapshot().await.count, 0);
    }

    #[tokio::test]
    async fn reset_without_save_discards() {
        let (controller, _, storage) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }

        assert!(controller.reset_counter(false).await.unwrap().is_none());
        assert!(controller.stop_detection().await.unwrap().is_none());
        assert_eq!(storage.get("pushup-stats-pose").unwrap(), None);
    }

    #[tokio::test]
    async fn failed_save_on_stop_is_recorded_once_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage = Arc::new(JsonFileStore::open(path.clone()).unwrap());
        let sink = Arc::new(MemorySink::new());
        let settings = CounterSettings {
            variant: Variant::Pose,
            ..CounterSettings::default()
        };
        let controller = CounterController::new(settings, storage, sink.clone());

        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }

        std::fs::create_dir(&path).unwrap();
        let err = controller.stop_detection().await.unwrap_err();
        assert!(matches!(err, CounterError::Storage(_)));
        assert!(!controller.is_running().await);

        let events = sink.events();
        assert!(events
            .iter()
            .any(|event| matches!(event, CounterEvent::DetectionStopped { count: 2, .. })));
        assert!(events
            .iter()
            .any(|event| matches!(event, CounterEvent::Error { .. })));
        assert_eq!(controller.stats().await.total, 0);

        std::fs::remove_dir(&path).unwrap();
        let summary = controller.reset_counter(true).await.unwrap().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.session_count, 1);

        let reopened = JsonFileStore::open(path).unwrap();
        let recorder = SessionRecorder::new(Arc::new(reopened), Variant::Pose);
        assert_eq!(recorder.load().total, 2);
    }

    #[tokio::test]
    async fn lost_pose_keeps_the_count() {
        let (controller, sink, _) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        controller.on_tick(arm_at(170.0)).await.unwrap();
        controller.on_tick(arm_at(90.0)).await.unwrap();
        sink.clear();

        let state = controller
            .on_tick(DetectionInput::Pose(None))
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_down);
        let events = sink.events();
        assert!(events.contains(&CounterEvent::PositionIndicator { down: false }));
        assert!(events.contains(&CounterEvent::PoseStatus {
            status: PoseStatus::Neutral
        }));

        let state = controller.on_tick(arm_at(170.0)).await.unwrap().unwrap();
        assert_eq!(state.count, 1);
        controller.stop_detection().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn validated_flash_reverts_to_neutral() {
        let (controller, sink, _) = controller(Variant::Pose);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();
        for angle in [170.0, 90.0, 170.0] {
            controller.on_tick(arm_at(angle)).await.unwrap();
        }
        sink.clear();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let events = sink.events();
        assert!(events.contains(&CounterEvent::CounterPulse { enlarged: false }));
        assert!(events.contains(&CounterEvent::PoseStatus {
            status: PoseStatus::Neutral
        }));
        controller.stop_detection().await.unwrap();
    }

    #[tokio::test]
    async fn failed_source_leaves_counter_idle() {
        struct Denied;
        impl FrameSource for Denied {
            fn start(&mut self) -> anyhow::Result<tokio::sync::mpsc::Receiver<DetectionInput>> {
                Err(anyhow!("permission denied"))
            }
            fn stop(&mut self) {}
        }

        let (controller, sink, _) = controller(Variant::Motion);
        let err = controller.start_detection(Box::new(Denied)).await.unwrap_err();
        assert!(matches!(err, CounterError::Acquisition(_)));
        assert!(!controller.is_running().await);
        assert!(sink
            .events()
            .iter()
            .any(|event| matches!(event, CounterEvent::Error { .. })));
    }

    #[tokio::test]
    async fn reconfigure_is_refused_while_running() {
        let (controller, _, _) = controller(Variant::Motion);
        controller
            .start_detection(Box::new(FrameSender::new().source()))
            .await
            .unwrap();

        let pose = CounterSettings {
            variant: Variant::Pose,
            ..CounterSettings::default()
        };
        assert!(controller.reconfigure(&pose).await.is_err());
        controller.stop_detection().await.unwrap();

        controller.reconfigure(&pose).await.unwrap();
        assert_eq!(controller.snapshot().await.variant, Variant::Pose);
    }
}
