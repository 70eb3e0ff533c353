use tauri::State;

use crate::{
    counter::{CounterController, CounterSnapshot},
    detection::{DetectionInput, Frame, PoseLandmarks, PushOutcome},
    settings::CounterSettings,
    stats::StatsSummary,
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> CounterController {
    state.counter.clone()
}

#[tauri::command]
pub async fn get_counter_state(state: State<'_, AppState>) -> Result<CounterSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn get_stats(state: State<'_, AppState>) -> Result<StatsSummary, String> {
    let controller = controller_from_state(&state);
    Ok(controller.stats().await)
}

/// Called by the webview once the camera stream is playing.
#[tauri::command]
pub async fn start_detection(state: State<'_, AppState>) -> Result<CounterSnapshot, String> {
    let controller = controller_from_state(&state);
    let source = state.frames.source();
    controller
        .start_detection(Box::new(source))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_detection(state: State<'_, AppState>) -> Result<Option<StatsSummary>, String> {
    let controller = controller_from_state(&state);
    controller.stop_detection().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_counter(
    state: State<'_, AppState>,
    save: bool,
) -> Result<Option<StatsSummary>, String> {
    let controller = controller_from_state(&state);
    controller.reset_counter(save).await.map_err(|e| e.to_string())
}

/// Pushes one RGBA frame. Returns `false` when the frame was dropped.
#[tauri::command]
pub fn submit_frame(
    state: State<'_, AppState>,
    width: u32,
    height: u32,
    data: Vec<u8>,
) -> Result<bool, String> {
    let frame = Frame::new(width, height, data).map_err(|e| e.to_string())?;
    Ok(state.frames.push(DetectionInput::Frame(frame)) == PushOutcome::Delivered)
}

/// Pushes the landmarks the webview's pose model found (`None` when nobody
/// was in view).
#[tauri::command]
pub fn submit_landmarks(
    state: State<'_, AppState>,
    landmarks: Option<PoseLandmarks>,
) -> Result<bool, String> {
    Ok(state.frames.push(DetectionInput::Pose(landmarks)) == PushOutcome::Delivered)
}

#[tauri::command]
pub fn report_camera_error(state: State<'_, AppState>, reason: String) -> String {
    state.counter.fail_acquisition(&reason).to_string()
}

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> CounterSettings {
    state.settings.counter()
}

#[tauri::command]
pub async fn set_settings(
    state: State<'_, AppState>,
    settings: CounterSettings,
) -> Result<(), String> {
    let controller = controller_from_state(&state);
    controller
        .reconfigure(&settings)
        .await
        .map_err(|e| e.to_string())?;
    state
        .settings
        .update_counter(settings)
        .map_err(|e| e.to_string())
}
