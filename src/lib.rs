pub mod counter;
pub mod detection;
pub mod error;
pub mod replay;
pub mod settings;
pub mod stats;
mod utils;

pub use counter::{CounterController, CounterEvent, CounterSnapshot, EventSink};
pub use error::CounterError;
pub use settings::{CounterSettings, Variant};

#[cfg(feature = "desktop")]
use std::sync::Arc;

#[cfg(feature = "desktop")]
use counter::commands::{
    get_counter_state, get_settings, get_stats, report_camera_error, reset_counter,
    set_settings, start_detection, stop_detection, submit_frame, submit_landmarks,
};
#[cfg(feature = "desktop")]
use detection::FrameSender;
#[cfg(feature = "desktop")]
use settings::SettingsStore;
#[cfg(feature = "desktop")]
use stats::JsonFileStore;
#[cfg(feature = "desktop")]
use tauri::Manager;

#[cfg(feature = "desktop")]
pub(crate) struct AppState {
    pub(crate) counter: CounterController,
    pub(crate) settings: SettingsStore,
    /// Where the webview pushes camera frames or landmarks.
    pub(crate) frames: FrameSender,
}

/// Logging honours `RUST_LOG` and defaults to `info`. `PUSHCOUNT_DEBUG=1`
/// turns on per-tick output for this crate.
pub fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if utils::logging::tick_tracing_enabled() {
        builder.filter_module("pushcount_lib", log::LevelFilter::Debug);
    }
    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();

    log::info!("pushcount starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;
                let storage = Arc::new(JsonFileStore::open(app_data_dir.join("storage.json"))?);
                let sink: Arc<dyn EventSink> = Arc::new(app.handle().clone());
                let counter = CounterController::new(settings.counter(), storage, sink);

                app.manage(AppState {
                    counter,
                    settings,
                    frames: FrameSender::new(),
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            get_counter_state,
            get_stats,
            start_detection,
            stop_detection,
            reset_counter,
            submit_frame,
            submit_landmarks,
            report_camera_error,
            get_settings,
            set_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
