//! Headless runs: feed recorded frames or landmarks through the counter and
//! record the result like a live session.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};

use crate::{
    counter::{CounterController, LogSink},
    detection::{FrameSource, ImageSequenceSource, LandmarkSequenceSource},
    settings::{SettingsStore, Variant},
    stats::{JsonFileStore, StatsSummary},
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

const DEFAULT_DATA_DIR: &str = ".pushcount";
const DEFAULT_INTERVAL_MS: u64 = 33;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    /// Directory of frame images, or a JSON-lines landmark file.
    pub input: PathBuf,
    pub data_dir: PathBuf,
    pub interval: Duration,
}

impl ReplayOptions {
    /// `<input> [--data-dir DIR] [--interval-ms N]`
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut input = None;
        let mut data_dir = std::env::var_os("PUSHCOUNT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let mut interval = Duration::from_millis(DEFAULT_INTERVAL_MS);

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--data-dir" => {
                    let value = args.next().context("--data-dir needs a value")?;
                    data_dir = PathBuf::from(value);
                }
                "--interval-ms" => {
                    let value = args.next().context("--interval-ms needs a value")?;
                    let millis: u64 = value
                        .parse()
                        .with_context(|| format!("invalid --interval-ms {value}"))?;
                    interval = Duration::from_millis(millis);
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                path if input.is_none() => input = Some(PathBuf::from(path)),
                extra => bail!("unexpected argument {extra}"),
            }
        }

        let Some(input) = input else {
            bail!("usage: pushcount <frames-dir | landmarks.jsonl> [--data-dir DIR] [--interval-ms N]");
        };

        Ok(Self {
            input,
            data_dir,
            interval,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub variant: Variant,
    pub count: u32,
    /// Stats after recording, `None` when no rep was counted.
    pub summary: Option<StatsSummary>,
}

fn open_source(input: &Path, interval: Duration) -> Result<(Variant, Box<dyn FrameSource>)> {
    if input.is_dir() {
        let source = ImageSequenceSource::from_dir(input, interval)?;
        log_info!("Replaying {} frames from {}", source.len(), input.display());
        return Ok((Variant::Motion, Box::new(source)));
    }

    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let source = LandmarkSequenceSource::from_json_lines(&contents, interval)?;
    log_info!("Replaying {} landmark sets from {}", source.len(), input.display());
    Ok((Variant::Pose, Box::new(source)))
}

/// Runs the whole input through a fresh detection run. The variant follows
/// the input: a directory replays frames, a file replays landmarks.
pub async fn replay(options: &ReplayOptions) -> Result<ReplayReport> {
    let settings_store = SettingsStore::new(options.data_dir.join("settings.json"))?;
    let storage = Arc::new(JsonFileStore::open(options.data_dir.join("storage.json"))?);

    let (variant, source) = open_source(&options.input, options.interval)?;
    let mut settings = settings_store.counter();
    settings.variant = variant;

    let controller = CounterController::new(settings, storage, Arc::new(LogSink));
    controller.start_detection(source).await?;
    controller.wait_for_source_end().await;

    let count = controller.snapshot().await.count;
    let summary = controller.stop_detection().await?;

    Ok(ReplayReport {
        variant,
        count,
        summary,
    })
}

pub fn run_headless(args: impl IntoIterator<Item = String>) -> Result<()> {
    crate::init_logging();

    let options = ReplayOptions::from_args(args)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let report = runtime.block_on(replay(&options))?;

    println!("{} push-ups ({:?} detection)", report.count, report.variant);
    if let Some(summary) = report.summary {
        let record = summary
            .record
            .map(|record| record.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "total {} over {} recent sessions, record {record}",
            summary.total, summary.session_count
        );
        for entry in summary.history {
            println!("  {} {:>4}  {}", entry.emoji, entry.count, entry.date_label);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_options() {
        let options =
            ReplayOptions::from_args(args(&["frames", "--data-dir", "/tmp/x", "--interval-ms", "5"]))
                .unwrap();
        assert_eq!(options.input, PathBuf::from("frames"));
        assert_eq!(options.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(options.interval, Duration::from_millis(5));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(ReplayOptions::from_args(args(&[])).is_err());
        assert!(ReplayOptions::from_args(args(&["a", "b"])).is_err());
        assert!(ReplayOptions::from_args(args(&["a", "--fast"])).is_err());
        assert!(ReplayOptions::from_args(args(&["a", "--interval-ms", "soon"])).is_err());
    }
}
